//! Response evaluation: confidence scoring and hallucination flagging.
//!
//! Confidence blends retrieval similarity with context coverage of the
//! draft. The hallucination scan is a deliberately simple token-overlap
//! heuristic: it triggers review, it never blocks a response.


use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::vectordb::ScoredChunk;

/// Weight of retrieval similarity in the confidence blend.
const SIMILARITY_WEIGHT: f32 = 0.6;
/// Weight of context coverage in the confidence blend.
const COVERAGE_WEIGHT: f32 = 0.4;

/// Kind of ungrounded claim found in a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    /// Numeric quantity absent from the context.
    Number,
    /// Date or year absent from the context.
    Date,
    /// Named entity absent from the context.
    Entity,
    /// Categorical claim ("always", "never", ...) absent from the context.
    CategoricalClaim,
}

/// One claim in the draft that is not traceable to the retrieved context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HallucinationFlag {
    /// Claim class.
    pub kind: FlagKind,
    /// The literal text that raised the flag.
    pub value: String,
}

/// Evaluation of one draft against its retrieval context.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// Blended confidence in `[0, 1]`.
    pub confidence: f32,
    /// Fraction of draft content words grounded in the context.
    pub coverage: f32,
    /// Ungrounded claims found in the draft.
    pub hallucination_flags: Vec<HallucinationFlag>,
    /// The draft reads as a "not in the materials" refusal.
    pub is_refusal: bool,
    /// Route this turn to a human.
    pub needs_review: bool,
}

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d[\d,]*(?:\.\d+)?%?\b").expect("number pattern"));

// Months stay case-sensitive so prose "may" is not read as a date.
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:January|February|March|April|May|June|July|August|September|October|November|December)\b(?:\s+\d{1,2}(?:,\s*\d{4})?)?|\b(?:19|20)\d{2}\b",
    )
    .expect("date pattern")
});

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b").expect("entity pattern")
});

static CATEGORICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(always|never|guaranteed)\b").expect("categorical pattern")
});

const REFUSAL_MARKERS: [&str; 5] = [
    "not in the provided materials",
    "not covered in the materials",
    "don't have that in the provided materials",
    "no information about that in the course materials",
    "cannot find that in the provided materials",
];

const STOPWORDS: [&str; 44] = [
    "the", "and", "for", "that", "this", "with", "you", "your", "from", "are", "was", "were",
    "have", "has", "had", "not", "but", "can", "will", "would", "should", "could", "about",
    "into", "over", "under", "then", "than", "them", "they", "their", "there", "here", "what",
    "when", "where", "which", "while", "how", "all", "any", "also", "its", "it's",
];

/// Stateless evaluator; thresholds come from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ResponseEvaluator {
    review_threshold: f32,
}

impl ResponseEvaluator {
    /// Evaluator escalating below `review_threshold` (exclusive).
    pub fn new(review_threshold: f32) -> Self {
        Self { review_threshold }
    }

    /// Scores a draft against the kept retrieval context.
    ///
    /// With an empty context, coverage is zero and a non-refusal draft is
    /// escalated outright.
    pub fn evaluate(&self, draft: &str, context: &[ScoredChunk]) -> Evaluation {
        let context_text: String = context
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let coverage = if context.is_empty() {
            0.0
        } else {
            coverage_fraction(draft, &context_text)
        };

        let avg_score = if context.is_empty() {
            0.0
        } else {
            context.iter().map(|c| c.score).sum::<f32>() / context.len() as f32
        };

        let confidence = (SIMILARITY_WEIGHT * avg_score + COVERAGE_WEIGHT * coverage).clamp(0.0, 1.0);

        let is_refusal = is_refusal(draft);
        let hallucination_flags = if is_refusal {
            Vec::new()
        } else {
            scan_hallucinations(draft, &context_text)
        };

        // The review boundary is exclusive: exactly at threshold passes.
        let needs_review = confidence < self.review_threshold
            || !hallucination_flags.is_empty()
            || (context.is_empty() && !is_refusal);

        Evaluation {
            confidence,
            coverage,
            hallucination_flags,
            is_refusal,
            needs_review,
        }
    }
}

/// True when the draft reads as a grounded refusal.
pub fn is_refusal(draft: &str) -> bool {
    let lowered = draft.to_lowercase();
    REFUSAL_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Fraction of draft content words present in the context after crude
/// lemma normalization.
fn coverage_fraction(draft: &str, context_text: &str) -> f32 {
    let draft_words = content_words(draft);
    if draft_words.is_empty() {
        return 0.0;
    }

    let context_words: HashSet<String> = content_words(context_text).into_iter().collect();

    let grounded = draft_words
        .iter()
        .filter(|w| context_words.contains(*w))
        .count();

    grounded as f32 / draft_words.len() as f32
}

fn content_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(normalize_word)
        .filter(|w| w.len() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Crude lemma normalization: lowercase and strip common suffixes.
fn normalize_word(word: &str) -> String {
    let lowered = word.to_lowercase();

    for (suffix, replacement) in [("ies", "y"), ("ing", ""), ("ed", ""), ("es", ""), ("s", "")] {
        if let Some(stem) = lowered.strip_suffix(suffix)
            && stem.len() >= 3
        {
            return format!("{stem}{replacement}");
        }
    }
    lowered
}

fn scan_hallucinations(draft: &str, context_text: &str) -> Vec<HallucinationFlag> {
    let context_lower = context_text.to_lowercase();
    let mut flags = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |kind: FlagKind, value: &str| {
        let key = value.to_lowercase();
        if seen.insert(key) {
            flags.push(HallucinationFlag {
                kind,
                value: value.to_string(),
            });
        }
    };

    for m in NUMBER.find_iter(draft) {
        let literal = m.as_str();
        let normalized = literal.replace(',', "");
        if !context_lower.contains(&normalized.to_lowercase())
            && !context_lower.contains(&literal.to_lowercase())
        {
            push(FlagKind::Number, literal);
        }
    }

    for m in DATE.find_iter(draft) {
        let literal = m.as_str();
        if !context_lower.contains(&literal.to_lowercase()) {
            push(FlagKind::Date, literal);
        }
    }

    for m in ENTITY.find_iter(draft) {
        let literal = m.as_str();
        if !context_lower.contains(&literal.to_lowercase()) {
            push(FlagKind::Entity, literal);
        }
    }

    for m in CATEGORICAL.find_iter(draft) {
        let literal = m.as_str();
        if !context_lower.contains(&literal.to_lowercase()) {
            push(FlagKind::CategoricalClaim, literal);
        }
    }

    flags
}
