//! Sliding-window conversation memory bounded by a token budget.
//!
//! The invariant holds after every mutation: `tokens(summary) +
//! tokens(messages) <= max_context_tokens`. When an append would break it,
//! the oldest messages are condensed into a rolling summary via the model
//! gateway; if a single pathological turn still exceeds the budget, the
//! oldest remaining turn is truncated from the head with a literal
//! `[truncated]` marker.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::gateway::GatewayError;
use crate::tokens::TokenCounter;

/// Author of a memory message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Pipeline-provided instructions.
    System,
    /// Student input.
    User,
    /// Model output.
    Assistant,
    /// Condensed history, always at the head.
    Summary,
}

/// One remembered message.
#[derive(Debug, Clone)]
pub struct MemoryMessage {
    /// Author.
    pub role: Role,
    /// Body.
    pub content: String,
}

/// What an append had to do to keep the invariant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendEffect {
    /// Oldest messages were folded into the summary.
    pub summarized: bool,
    /// A turn was head-truncated.
    pub truncated: bool,
}

/// Marker prepended to head-truncated turns.
pub const TRUNCATION_MARKER: &str = "[truncated]";

/// Token-bounded message window with a rolling summary.
#[derive(Debug)]
pub struct ConversationMemory {
    messages: Vec<MemoryMessage>,
    summary: Option<String>,
    max_context_tokens: usize,
    counter: TokenCounter,
}

impl ConversationMemory {
    /// Empty memory with the given budget.
    pub fn new(config: MemoryConfig, counter: TokenCounter) -> Self {
        Self {
            messages: Vec::new(),
            summary: None,
            max_context_tokens: config.max_context_tokens,
            counter,
        }
    }

    /// Appends a message, summarizing or truncating as needed to restore
    /// the token invariant.
    ///
    /// `summarize` condenses prior history text into a shorter summary; on
    /// failure the affected messages are dropped instead so the invariant
    /// holds regardless.
    pub async fn append<F, Fut>(
        &mut self,
        role: Role,
        content: impl Into<String>,
        summarize: F,
    ) -> AppendEffect
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, GatewayError>>,
    {
        self.messages.push(MemoryMessage {
            role,
            content: content.into(),
        });

        let mut effect = AppendEffect::default();
        if self.total_tokens() <= self.max_context_tokens {
            return effect;
        }

        effect.summarized = self.summarize_oldest(summarize).await;

        if self.total_tokens() > self.max_context_tokens {
            self.truncate_head();
            effect.truncated = true;
        }

        debug_assert!(self.total_tokens() <= self.max_context_tokens);
        effect
    }

    /// Current context: `[summary?] ++ messages`, chronological.
    pub fn context(&self) -> Vec<MemoryMessage> {
        let mut context = Vec::with_capacity(self.messages.len() + 1);
        if let Some(summary) = &self.summary {
            context.push(MemoryMessage {
                role: Role::Summary,
                content: summary.clone(),
            });
        }
        context.extend(self.messages.iter().cloned());
        context
    }

    /// Drops everything.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.summary = None;
    }

    /// Tokens used by the summary and all messages, framing included.
    pub fn total_tokens(&self) -> usize {
        let summary_tokens = self
            .summary
            .as_deref()
            .map(|s| self.counter.count_messages([s]))
            .unwrap_or(0);
        summary_tokens
            + self
                .counter
                .count_messages(self.messages.iter().map(|m| m.content.as_str()))
    }

    /// Configured budget.
    pub fn max_context_tokens(&self) -> usize {
        self.max_context_tokens
    }

    /// Folds the oldest messages into the rolling summary until the rest
    /// fits with slack. Returns whether a summary replaced any messages.
    async fn summarize_oldest<F, Fut>(&mut self, summarize: F) -> bool
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String, GatewayError>>,
    {
        // Leave headroom so the next few appends do not immediately
        // re-trigger summarization.
        let slack = self.max_context_tokens / 10;
        let target = self.max_context_tokens.saturating_sub(slack);

        // Never fold the newest message: it is the turn being appended.
        let mut take = 0usize;
        while take < self.messages.len().saturating_sub(1) {
            take += 1;
            let remaining: usize = self
                .counter
                .count_messages(self.messages[take..].iter().map(|m| m.content.as_str()));
            if remaining <= target {
                break;
            }
        }

        if take == 0 {
            return false;
        }

        let folded: Vec<MemoryMessage> = self.messages.drain(..take).collect();
        let mut transcript = String::new();
        if let Some(prior) = &self.summary {
            transcript.push_str("Earlier summary:\n");
            transcript.push_str(prior);
            transcript.push_str("\n\n");
        }
        for message in &folded {
            let speaker = match message.role {
                Role::System => "system",
                Role::User => "student",
                Role::Assistant => "assistant",
                Role::Summary => "summary",
            };
            transcript.push_str(speaker);
            transcript.push_str(": ");
            transcript.push_str(&message.content);
            transcript.push('\n');
        }

        match summarize(transcript).await {
            Ok(summary) => {
                self.summary = Some(summary);
                true
            }
            Err(e) => {
                // Degrade by dropping the folded messages outright; the
                // invariant matters more than continuity.
                warn!("history summarization failed, dropping {} messages: {e}", folded.len());
                self.summary = None;
                true
            }
        }
    }

    /// Head-truncates the oldest turn (removing emptied turns) until the
    /// window fits.
    fn truncate_head(&mut self) {
        while self.total_tokens() > self.max_context_tokens {
            // Oversized summaries go first; they are already lossy.
            if let Some(summary) = self.summary.take() {
                let kept = Self::tail_half(&summary);
                if !kept.is_empty() && self.counter.count(&kept) < self.counter.count(&summary) {
                    self.summary = Some(kept);
                }
                continue;
            }

            let Some(first) = self.messages.first_mut() else {
                return;
            };

            let stripped = first
                .content
                .strip_prefix(TRUNCATION_MARKER)
                .map(|rest| rest.trim_start().to_string())
                .unwrap_or_else(|| first.content.clone());
            let kept = Self::tail_half(&stripped);

            // Remove the turn outright once halving stops making progress.
            if kept.is_empty() || kept.len() >= stripped.len() {
                debug!("dropping fully truncated turn");
                self.messages.remove(0);
            } else {
                first.content = format!("{TRUNCATION_MARKER} {kept}");
            }
        }
    }

    fn tail_half(text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        chars[chars.len() / 2..].iter().collect::<String>().trim_start().to_string()
    }
}

/// Session-owned memory store, one entry per live conversation.
///
/// Turns within a conversation are serialized by the per-entry mutex; the
/// endpoint layer holds it across the whole agent run.
pub struct MemoryRegistry {
    sessions: DashMap<String, Arc<Mutex<ConversationMemory>>>,
    config: MemoryConfig,
    counter: TokenCounter,
}

impl MemoryRegistry {
    /// Empty registry.
    pub fn new(config: MemoryConfig, counter: TokenCounter) -> Self {
        Self {
            sessions: DashMap::new(),
            config,
            counter,
        }
    }

    /// Returns the memory bound to `conversation_id`, creating it if absent.
    pub fn bind(&self, conversation_id: &str) -> Arc<Mutex<ConversationMemory>> {
        self.sessions
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(ConversationMemory::new(
                    self.config,
                    self.counter.clone(),
                )))
            })
            .clone()
    }

    /// Destroys a conversation's memory (disconnect or idle timeout).
    pub fn remove(&self, conversation_id: &str) {
        self.sessions.remove(conversation_id);
    }

    /// Live conversation count.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no conversations are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
