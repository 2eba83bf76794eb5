//! Provider-facing call types and the transport trait.

use std::pin::Pin;

use futures_util::Stream;
use serde::{Deserialize, Serialize};

use super::error::ProviderFailure;

/// Who authored a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions to the model.
    System,
    /// End-user input.
    User,
    /// Prior model output.
    Assistant,
}

/// One message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Author.
    pub role: ChatRole,
    /// Message body.
    pub content: String,
}

impl ChatTurn {
    /// System turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// User turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct ChatParams {
    /// Sampling temperature.
    pub temperature: f64,
    /// Completion token cap.
    pub max_tokens: u32,
}

/// Token usage reported (or estimated) for a completed generation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens consumed by the prompt.
    pub prompt_tokens: u32,
    /// Tokens produced in the completion.
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Prompt + completion.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Completed (non-streaming) generation.
#[derive(Debug, Clone)]
pub struct ChatOutput {
    /// Assembled response text.
    pub content: String,
    /// Reported usage; zeroed when the provider omits it.
    pub usage: TokenUsage,
}

/// Raw token stream from one provider call. Ends after the final token;
/// mid-stream failures surface as an `Err` item.
pub type ProviderTokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderFailure>> + Send>>;

/// Uniform transport over chat-completion, embedding, and speech-to-text
/// providers. Breakers, retry, and fallback live above this trait in
/// [`super::ModelGateway`].
pub trait ModelProvider: Send + Sync {
    /// Buffered chat completion against `model`.
    fn chat(
        &self,
        model: &str,
        turns: &[ChatTurn],
        params: &ChatParams,
    ) -> impl std::future::Future<Output = Result<ChatOutput, ProviderFailure>> + Send;

    /// Streaming chat completion against `model`.
    fn chat_stream(
        &self,
        model: &str,
        turns: &[ChatTurn],
        params: &ChatParams,
    ) -> impl std::future::Future<Output = Result<ProviderTokenStream, ProviderFailure>> + Send;

    /// Embeds a batch of texts; one vector per input, in order.
    fn embed(
        &self,
        model: &str,
        texts: &[String],
    ) -> impl std::future::Future<Output = Result<Vec<Vec<f32>>, ProviderFailure>> + Send;

    /// Transcribes an audio/video payload to text.
    fn transcribe(
        &self,
        model: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> impl std::future::Future<Output = Result<String, ProviderFailure>> + Send;
}
