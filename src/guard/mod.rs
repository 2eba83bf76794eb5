//! Prompt-injection screening.
//!
//! A compiled ruleset over the raw user input. High-threat matches
//! short-circuit the pipeline with a generic refusal; medium-threat matches
//! let the request continue under a hardened system prompt. Pattern labels
//! are for logs only and must never reach response bodies.

#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use base64::Engine;
use regex::Regex;
use serde::Serialize;

/// Assessed severity of an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    /// Nothing matched.
    None,
    /// Suspicious but tolerable; continue with a hardened system prompt.
    Medium,
    /// Clear injection attempt; refuse without calling the model.
    High,
}

/// Outcome of screening one input.
#[derive(Debug, Clone)]
pub struct GuardVerdict {
    /// True when any rule matched.
    pub is_injection: bool,
    /// Highest severity among matched rules.
    pub threat_level: ThreatLevel,
    /// Internal label of the first matching rule. Log-only.
    pub matched_pattern: Option<&'static str>,
}

impl GuardVerdict {
    fn clean() -> Self {
        Self {
            is_injection: false,
            threat_level: ThreatLevel::None,
            matched_pattern: None,
        }
    }
}

struct Rule {
    label: &'static str,
    level: ThreatLevel,
    pattern: Regex,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let rule = |label, level, pattern: &str| Rule {
        label,
        level,
        pattern: Regex::new(pattern).expect("guard pattern must compile"),
    };

    vec![
        rule(
            "instruction_override",
            ThreatLevel::High,
            r"(?i)\b(ignore|disregard|forget|override)\b.{0,40}\b(previous|prior|above|earlier|all|any|your)\b.{0,20}\b(instruction|prompt|rule|direction|guideline)",
        ),
        rule(
            "role_reassignment",
            ThreatLevel::High,
            r"(?i)\b(you are now|you're now|act as if you|pretend (to be|you are)|roleplay as|from now on,? you)\b",
        ),
        rule(
            "system_prompt_extraction",
            ThreatLevel::High,
            r"(?i)\b(print|reveal|show|repeat|output|display|leak)\b.{0,40}\b(system prompt|initial prompt|hidden prompt|your instructions)",
        ),
        rule(
            "jailbreak_token",
            ThreatLevel::High,
            r"(?i)\b(dan mode|developer mode|jailbreak|do anything now|aim jailbreak|stay in character)\b",
        ),
        rule(
            "delimiter_smuggling",
            ThreatLevel::Medium,
            r"(?i)(\[/?(system|inst)\]|<\|im_(start|end)\|>|```\s*system)",
        ),
    ]
});

static BASE64_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/]{80,}={0,2}").expect("base64 pattern must compile"));

/// Minimum decodable base64 run length considered suspicious.
const BASE64_SUSPICIOUS_LEN: usize = 80;

/// Control characters above this fraction of the input flag it.
const CONTROL_DENSITY_THRESHOLD: f64 = 0.05;
const CONTROL_MIN_COUNT: usize = 8;

/// Compiled-ruleset prompt guard. Stateless; `check` is deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptGuard;

impl PromptGuard {
    /// New guard over the built-in ruleset.
    pub fn new() -> Self {
        Self
    }

    /// Screens one input.
    pub fn check(&self, text: &str) -> GuardVerdict {
        let mut verdict = GuardVerdict::clean();

        for rule in RULES.iter() {
            if rule.pattern.is_match(text) {
                if rule.level > verdict.threat_level {
                    verdict = GuardVerdict {
                        is_injection: true,
                        threat_level: rule.level,
                        matched_pattern: Some(rule.label),
                    };
                }
                if verdict.threat_level == ThreatLevel::High {
                    return verdict;
                }
            }
        }

        if verdict.threat_level < ThreatLevel::Medium && Self::has_encoded_payload(text) {
            verdict = GuardVerdict {
                is_injection: true,
                threat_level: ThreatLevel::Medium,
                matched_pattern: Some("encoded_payload"),
            };
        }

        if verdict.threat_level < ThreatLevel::Medium && Self::control_density_excessive(text) {
            verdict = GuardVerdict {
                is_injection: true,
                threat_level: ThreatLevel::Medium,
                matched_pattern: Some("control_density"),
            };
        }

        verdict
    }

    fn has_encoded_payload(text: &str) -> bool {
        BASE64_RUN.find_iter(text).any(|m| {
            let candidate = m.as_str().trim_end_matches('=');
            // Align to a whole number of base64 quanta before decoding.
            let aligned = &candidate[..candidate.len() - candidate.len() % 4];
            aligned.len() >= BASE64_SUSPICIOUS_LEN
                && base64::engine::general_purpose::STANDARD_NO_PAD
                    .decode(aligned)
                    .is_ok()
        })
    }

    fn control_density_excessive(text: &str) -> bool {
        if text.is_empty() {
            return false;
        }

        let control = text
            .chars()
            .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
            .count();

        control >= CONTROL_MIN_COUNT
            && (control as f64 / text.chars().count() as f64) > CONTROL_DENSITY_THRESHOLD
    }
}
