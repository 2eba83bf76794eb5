//! Recursive character splitter with token budgets and overlap.
//!
//! Splits preferentially on paragraph, then sentence, then word boundaries,
//! merging pieces greedily up to `chunk_size` tokens and carrying
//! `chunk_overlap` tokens of trailing context into the next chunk.

use crate::config::ChunkingConfig;
use crate::tokens::TokenCounter;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Token-budgeted recursive splitter.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
    counter: TokenCounter,
}

impl RecursiveSplitter {
    /// Splitter with the given budgets.
    pub fn new(config: ChunkingConfig, counter: TokenCounter) -> Self {
        Self { config, counter }
    }

    /// Splits `text` into non-empty chunks of at most `chunk_size` tokens.
    pub fn split(&self, text: &str) -> Vec<String> {
        let pieces = self.decompose(text, &SEPARATORS);
        self.merge(pieces)
    }

    /// Breaks text into pieces no larger than the chunk budget, preferring
    /// coarse boundaries and recursing to finer ones only when needed.
    fn decompose(&self, text: &str, separators: &[&str]) -> Vec<String> {
        if self.counter.count(text) <= self.config.chunk_size {
            return vec![text.to_string()];
        }

        let Some((separator, rest)) = separators.split_first() else {
            return self.hard_split(text);
        };

        let mut pieces = Vec::new();
        for part in text.split_inclusive(separator) {
            if self.counter.count(part) > self.config.chunk_size {
                pieces.extend(self.decompose(part, rest));
            } else {
                pieces.push(part.to_string());
            }
        }
        pieces
    }

    /// Last resort for a single run with no usable boundaries: split on
    /// char boundaries near the token budget.
    fn hard_split(&self, text: &str) -> Vec<String> {
        // ~4 chars per token keeps slices under budget for typical text.
        let window = self.config.chunk_size.saturating_mul(3).max(1);
        let mut pieces = Vec::new();
        let mut current = String::new();

        for c in text.chars() {
            current.push(c);
            if current.len() >= window {
                pieces.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            pieces.push(current);
        }
        pieces
    }

    /// Greedily packs pieces into chunks, carrying overlap between
    /// consecutive chunks.
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_tokens = 0usize;

        for piece in pieces {
            let piece_tokens = self.counter.count(&piece);
            if piece_tokens == 0 {
                continue;
            }

            if current_tokens + piece_tokens > self.config.chunk_size && !current.is_empty() {
                self.emit(&mut chunks, &current);

                let tail = self.overlap_tail(&current);
                current_tokens = tail.iter().map(|p| self.counter.count(p)).sum();
                current = tail;
            }

            current_tokens += piece_tokens;
            current.push(piece);
        }

        if !current.is_empty() {
            self.emit(&mut chunks, &current);
        }

        chunks
    }

    fn emit(&self, chunks: &mut Vec<String>, pieces: &[String]) {
        let joined = pieces.concat();
        let trimmed = joined.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
    }

    /// Trailing pieces of the emitted chunk worth at most `chunk_overlap`
    /// tokens, preserved in order.
    fn overlap_tail(&self, pieces: &[String]) -> Vec<String> {
        if self.config.chunk_overlap == 0 {
            return Vec::new();
        }

        let mut tail: Vec<String> = Vec::new();
        let mut tokens = 0usize;

        for piece in pieces.iter().rev() {
            let piece_tokens = self.counter.count(piece);
            if tokens + piece_tokens > self.config.chunk_overlap {
                break;
            }
            tokens += piece_tokens;
            tail.push(piece.clone());
        }

        tail.reverse();
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(chunk_size: usize, chunk_overlap: usize) -> RecursiveSplitter {
        RecursiveSplitter::new(
            ChunkingConfig {
                chunk_size,
                chunk_overlap,
            },
            TokenCounter::heuristic(),
        )
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = splitter(800, 150).split("A single short paragraph.");
        assert_eq!(chunks, vec!["A single short paragraph."]);
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        assert!(splitter(800, 150).split("").is_empty());
        assert!(splitter(800, 150).split("   \n\n  ").is_empty());
    }

    #[test]
    fn long_text_splits_on_paragraphs_first() {
        let paragraph = "word ".repeat(60);
        let text = format!("{paragraph}\n\n{paragraph}\n\n{paragraph}");

        let chunks = splitter(40, 0).split(&text);

        assert!(chunks.len() >= 3);
        let counter = TokenCounter::heuristic();
        for chunk in &chunks {
            assert!(counter.count(chunk) <= 40, "chunk over budget: {chunk}");
        }
    }

    #[test]
    fn every_chunk_is_nonempty() {
        let text = "one.\n\n\n\ntwo.\n\n   \n\nthree.";
        for chunk in splitter(10, 2).split(text) {
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn overlap_repeats_trailing_content() {
        let sentences: Vec<String> = (0..20).map(|i| format!("sentence number {i}. ")).collect();
        let text = sentences.concat();

        let chunks = splitter(30, 10).split(&text);
        assert!(chunks.len() > 1);

        // Some sentence from the end of chunk N reappears at the start of
        // chunk N+1.
        let mut saw_overlap = false;
        for pair in chunks.windows(2) {
            let prev_tail: String = pair[0].chars().rev().take(30).collect();
            let tail: String = prev_tail.chars().rev().collect();
            if let Some(sentence) = tail.split(". ").last()
                && !sentence.trim().is_empty()
                && pair[1].contains(sentence.trim())
            {
                saw_overlap = true;
            }
        }
        assert!(saw_overlap, "no overlap observed between adjacent chunks");
    }

    #[test]
    fn unbroken_run_is_hard_split() {
        let text = "x".repeat(5_000);
        let chunks = splitter(100, 0).split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn chunk_order_preserves_document_order() {
        let text = format!(
            "{}\n\n{}\n\n{}",
            "alpha ".repeat(30),
            "beta ".repeat(30),
            "gamma ".repeat(30)
        );
        let chunks = splitter(40, 0).split(&text);

        let alpha_pos = chunks.iter().position(|c| c.contains("alpha")).unwrap();
        let beta_pos = chunks.iter().position(|c| c.contains("beta")).unwrap();
        let gamma_pos = chunks.iter().position(|c| c.contains("gamma")).unwrap();
        assert!(alpha_pos < beta_pos && beta_pos < gamma_pos);
    }
}
