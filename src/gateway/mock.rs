//! Scriptable in-process provider for tests and examples.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::error::ProviderFailure;
use super::provider::{
    ChatOutput, ChatParams, ChatTurn, ModelProvider, ProviderTokenStream, TokenUsage,
};

#[derive(Default)]
struct MockInner {
    embeddings: HashMap<String, Vec<f32>>,
    chat_responses: VecDeque<String>,
    // Failures scripted per model name, consumed before any success.
    chat_failures: HashMap<String, VecDeque<ProviderFailure>>,
    embed_failures: VecDeque<ProviderFailure>,
    transcript: Option<String>,
}

/// Deterministic provider double.
///
/// Embeddings default to a hash-derived unit vector (identical text, identical
/// vector; unrelated text, near-orthogonal) and can be pinned per text.
/// Chat responses are consumed from a queue, falling back to an echo. Failures
/// can be scripted per model to exercise retry, fallback, and breaker paths.
#[derive(Clone, Default)]
pub struct MockProvider {
    inner: Arc<Mutex<MockInner>>,
    chat_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    transcribe_calls: Arc<AtomicUsize>,
}

/// Embedding width produced by [`MockProvider`].
pub const MOCK_EMBEDDING_DIM: usize = 16;

impl MockProvider {
    /// Fresh mock with no scripted behavior.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the embedding returned for an exact text.
    pub fn with_embedding(self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.inner.lock().embeddings.insert(text.into(), vector);
        self
    }

    /// Queues a canned chat response.
    pub fn with_chat_response(self, response: impl Into<String>) -> Self {
        self.inner.lock().chat_responses.push_back(response.into());
        self
    }

    /// Scripts `count` failures for chat calls against `model`.
    pub fn with_chat_failures(self, model: impl Into<String>, failure: ProviderFailure, count: usize) -> Self {
        let mut inner = self.inner.lock();
        let queue = inner.chat_failures.entry(model.into()).or_default();
        for _ in 0..count {
            queue.push_back(failure.clone());
        }
        drop(inner);
        self
    }

    /// Scripts `count` failures for embedding calls.
    pub fn with_embed_failures(self, failure: ProviderFailure, count: usize) -> Self {
        let mut inner = self.inner.lock();
        for _ in 0..count {
            inner.embed_failures.push_back(failure.clone());
        }
        drop(inner);
        self
    }

    /// Sets the transcript returned for audio/video payloads.
    pub fn with_transcript(self, transcript: impl Into<String>) -> Self {
        self.inner.lock().transcript = Some(transcript.into());
        self
    }

    /// Number of chat calls placed (buffered + streaming).
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// Number of embedding calls placed.
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Number of transcription calls placed.
    pub fn transcribe_calls(&self) -> usize {
        self.transcribe_calls.load(Ordering::SeqCst)
    }

    /// Deterministic unit vector derived from the text's BLAKE3 hash.
    pub fn hash_embedding(text: &str) -> Vec<f32> {
        let hash = blake3::hash(text.as_bytes());
        let bytes = hash.as_bytes();

        let mut vector: Vec<f32> = (0..MOCK_EMBEDDING_DIM)
            .map(|i| {
                let b = bytes[i % bytes.len()];
                (b as f32 / 127.5) - 1.0
            })
            .collect();

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }

    fn next_chat(&self, model: &str, turns: &[ChatTurn]) -> Result<String, ProviderFailure> {
        let mut inner = self.inner.lock();

        if let Some(queue) = inner.chat_failures.get_mut(model)
            && let Some(failure) = queue.pop_front()
        {
            return Err(failure);
        }

        Ok(inner.chat_responses.pop_front().unwrap_or_else(|| {
            let last_user = turns
                .iter()
                .rev()
                .find(|t| matches!(t.role, super::provider::ChatRole::User))
                .map(|t| t.content.as_str())
                .unwrap_or("");
            format!("Mock response for: {last_user}")
        }))
    }
}

impl ModelProvider for MockProvider {
    async fn chat(
        &self,
        model: &str,
        turns: &[ChatTurn],
        _params: &ChatParams,
    ) -> Result<ChatOutput, ProviderFailure> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let content = self.next_chat(model, turns)?;
        Ok(ChatOutput {
            content,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 10,
            },
        })
    }

    async fn chat_stream(
        &self,
        model: &str,
        turns: &[ChatTurn],
        _params: &ChatParams,
    ) -> Result<ProviderTokenStream, ProviderFailure> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let content = self.next_chat(model, turns)?;

        // Split into word-sized tokens to exercise assembly downstream.
        let tokens: Vec<Result<String, ProviderFailure>> = content
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();

        Ok(Box::pin(tokio_stream::iter(tokens)))
    }

    async fn embed(&self, _model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderFailure> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);

        let mut inner = self.inner.lock();
        if let Some(failure) = inner.embed_failures.pop_front() {
            return Err(failure);
        }

        Ok(texts
            .iter()
            .map(|t| {
                inner
                    .embeddings
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| Self::hash_embedding(t))
            })
            .collect())
    }

    async fn transcribe(
        &self,
        _model: &str,
        filename: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, ProviderFailure> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .inner
            .lock()
            .transcript
            .clone()
            .unwrap_or_else(|| format!("Transcript of {filename}")))
    }
}
