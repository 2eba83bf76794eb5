//! Model-aware token estimation.
//!
//! Uses tiktoken's BPE vocabularies where the model family is known and a
//! character-based heuristic otherwise. Counts are estimates: they gate
//! budgets (context window, chunk sizing), not billing.

use std::sync::Arc;

/// Per-message framing overhead applied by chat completion APIs.
pub const PER_MESSAGE_OVERHEAD_TOKENS: usize = 4;

#[derive(Clone)]
enum Vocabulary {
    Bpe(Arc<tiktoken_rs::CoreBPE>),
    Heuristic,
}

/// Token counter bound to a model family at construction.
#[derive(Clone)]
pub struct TokenCounter {
    vocabulary: Vocabulary,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.vocabulary {
            Vocabulary::Bpe(_) => "bpe",
            Vocabulary::Heuristic => "heuristic",
        };
        f.debug_struct("TokenCounter").field("vocabulary", &kind).finish()
    }
}

impl TokenCounter {
    /// Builds a counter for `model`.
    ///
    /// Resolution order: o200k_base for the gpt-4o/o-series family,
    /// cl100k_base for gpt-4, claude, and embeddings models, heuristic for
    /// anything tiktoken does not cover (or if vocabulary loading fails).
    pub fn for_model(model: &str) -> Self {
        let m = model.to_lowercase();

        if m.contains("gpt-4o") || m.contains("o1") || m.contains("o3") {
            if let Ok(bpe) = tiktoken_rs::o200k_base() {
                return Self {
                    vocabulary: Vocabulary::Bpe(Arc::new(bpe)),
                };
            }
        }

        let known = m.contains("gpt")
            || m.contains("claude")
            || m.contains("text-embedding")
            || m.contains("whisper");
        if known {
            if let Ok(bpe) = tiktoken_rs::cl100k_base() {
                return Self {
                    vocabulary: Vocabulary::Bpe(Arc::new(bpe)),
                };
            }
        }

        Self {
            vocabulary: Vocabulary::Heuristic,
        }
    }

    /// Counter with the character heuristic only. Used by tests and as the
    /// fallback when no model is configured.
    pub fn heuristic() -> Self {
        Self {
            vocabulary: Vocabulary::Heuristic,
        }
    }

    /// Estimated token count of a single string.
    pub fn count(&self, text: &str) -> usize {
        match &self.vocabulary {
            Vocabulary::Bpe(bpe) => bpe.encode_with_special_tokens(text).len(),
            Vocabulary::Heuristic => {
                if text.is_empty() {
                    return 0;
                }
                // chars / 3.5, plus ~15% safety margin
                let raw = (text.len() as f64 / 3.5).ceil() as usize;
                raw + raw / 7
            }
        }
    }

    /// Estimated token count of a message list, including per-message
    /// framing overhead.
    pub fn count_messages<'a, I>(&self, contents: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        contents
            .into_iter()
            .map(|c| self.count(c) + PER_MESSAGE_OVERHEAD_TOKENS)
            .sum()
    }
}
