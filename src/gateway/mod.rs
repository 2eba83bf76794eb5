//! Model gateway: one call surface over chat, embedding, and speech-to-text
//! providers.
//!
//! Every operation is guarded by a per-dependency circuit breaker, retried
//! with jittered exponential backoff on transient failures, and — for chat —
//! backed by a primary → secondary fallback chain. The chain advances only on
//! transient or server-side failure, never on policy rejections.

pub mod breaker;
pub mod error;
pub mod live;
pub mod provider;
pub mod retry;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use breaker::{BreakerOpen, BreakerState, CircuitBreaker};
pub use error::{FailureKind, GatewayError, ProviderFailure};
pub use live::LiveProvider;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MOCK_EMBEDDING_DIM, MockProvider};
pub use provider::{
    ChatOutput, ChatParams, ChatRole, ChatTurn, ModelProvider, ProviderTokenStream, TokenUsage,
};

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, instrument, warn};

use crate::config::{BreakerConfig, ModelConfig, RetryConfig};
use crate::tokens::TokenCounter;

/// One event on a gateway token stream.
#[derive(Debug)]
pub enum StreamItem {
    /// A generated token, emitted as it arrives.
    Token(String),
    /// Terminal event: the fully assembled text and usage. Emitted exactly
    /// once, after the last token.
    Done {
        /// Assembled response text.
        text: String,
        /// Final usage (estimated when the provider omits it).
        usage: TokenUsage,
    },
    /// Terminal failure; no further events follow.
    Error(GatewayError),
}

/// Stream returned by [`ModelGateway::chat_stream`]. Dropping it detaches
/// the consumer and cancels the upstream request.
pub type GatewayStream = ReceiverStream<StreamItem>;

/// Breaker states per external dependency, surfaced by `/health`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GatewayHealth {
    /// Primary chat model breaker.
    pub chat_primary: BreakerState,
    /// Secondary chat model breaker.
    pub chat_secondary: BreakerState,
    /// Embedding endpoint breaker.
    pub embedding: BreakerState,
    /// Transcription endpoint breaker.
    pub transcription: BreakerState,
}

impl GatewayHealth {
    /// True when at least one chat stage can accept calls.
    pub fn chat_available(&self) -> bool {
        self.chat_primary != BreakerState::Open || self.chat_secondary != BreakerState::Open
    }
}

enum StageError {
    Open(BreakerOpen),
    Failed(ProviderFailure),
}

/// Circuit-broken, retrying front door to all model providers.
pub struct ModelGateway<P: ModelProvider> {
    provider: P,
    models: ModelConfig,
    retry: RetryConfig,
    chat_primary: Arc<CircuitBreaker>,
    chat_secondary: Arc<CircuitBreaker>,
    embedding: Arc<CircuitBreaker>,
    transcription: Arc<CircuitBreaker>,
    counter: TokenCounter,
}

impl<P: ModelProvider> ModelGateway<P> {
    /// Builds a gateway over `provider`.
    pub fn new(
        provider: P,
        models: ModelConfig,
        breaker: BreakerConfig,
        retry: RetryConfig,
    ) -> Self {
        let counter = TokenCounter::for_model(&models.primary_chat);
        Self {
            provider,
            models,
            retry,
            chat_primary: Arc::new(CircuitBreaker::new("chat_primary", breaker)),
            chat_secondary: Arc::new(CircuitBreaker::new("chat_secondary", breaker)),
            embedding: Arc::new(CircuitBreaker::new("embedding", breaker)),
            transcription: Arc::new(CircuitBreaker::new("transcription", breaker)),
            counter,
        }
    }

    /// The underlying provider (used by tests to inspect call counts).
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Model configuration in effect.
    pub fn models(&self) -> &ModelConfig {
        &self.models
    }

    /// Generation parameters derived from configuration.
    pub fn chat_params(&self) -> ChatParams {
        ChatParams {
            temperature: self.models.temperature,
            max_tokens: self.models.max_tokens,
        }
    }

    /// Current breaker states.
    pub fn health(&self) -> GatewayHealth {
        GatewayHealth {
            chat_primary: self.chat_primary.state(),
            chat_secondary: self.chat_secondary.state(),
            embedding: self.embedding.state(),
            transcription: self.transcription.state(),
        }
    }

    /// Embeds a batch of texts. One vector per input, input order preserved.
    #[instrument(skip(self, texts), fields(batch = texts.len()))]
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, GatewayError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.models.embedding.clone();
        self.run_stage(&self.embedding, || self.provider.embed(&model, texts))
            .await
            .map_err(stage_to_gateway_error)
    }

    /// Embeds a single text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, GatewayError> {
        let texts = [text.to_string()];
        let mut vectors = self.embed(&texts).await?;
        vectors.pop().ok_or_else(|| GatewayError::UpstreamUnavailable {
            message: "embedding provider returned no vectors".to_string(),
        })
    }

    /// Transcribes an audio/video payload.
    #[instrument(skip(self, bytes), fields(filename, bytes = bytes.len()))]
    pub async fn transcribe(&self, filename: &str, bytes: Vec<u8>) -> Result<String, GatewayError> {
        let model = self.models.transcription.clone();
        self.run_stage(&self.transcription, || {
            self.provider.transcribe(&model, filename, bytes.clone())
        })
        .await
        .map_err(stage_to_gateway_error)
    }

    /// Buffered chat completion through the fallback chain.
    #[instrument(skip(self, turns), fields(turns = turns.len()))]
    pub async fn chat(&self, turns: &[ChatTurn]) -> Result<ChatOutput, GatewayError> {
        let params = self.chat_params();
        let mut last_detail = String::new();

        for (model, breaker) in self.chat_stages() {
            match self
                .run_stage(breaker, || self.provider.chat(model, turns, &params))
                .await
            {
                Ok(mut output) => {
                    if output.usage.total() == 0 {
                        output.usage = self.estimate_usage(turns, &output.content);
                    }
                    return Ok(output);
                }
                Err(StageError::Open(_)) => {
                    debug!(model, "chat stage skipped: breaker open");
                    last_detail = format!("{model}: breaker open");
                }
                Err(StageError::Failed(failure)) => match failure.kind {
                    FailureKind::Transient => {
                        warn!(model, "chat stage exhausted: {}", failure.message);
                        last_detail = failure.message;
                    }
                    FailureKind::Policy => {
                        return Err(GatewayError::PolicyRejection {
                            message: failure.message,
                        });
                    }
                    FailureKind::Invalid => {
                        return Err(GatewayError::InvalidRequest {
                            message: failure.message,
                        });
                    }
                },
            }
        }

        Err(GatewayError::UpstreamUnavailable {
            message: last_detail,
        })
    }

    /// Streaming chat completion through the fallback chain.
    ///
    /// Tokens are forwarded as they arrive; a single terminal
    /// [`StreamItem::Done`] carries the assembled text and usage. Dropping
    /// the returned stream cancels the upstream request and suppresses the
    /// terminal event.
    #[instrument(skip(self, turns), fields(turns = turns.len()))]
    pub async fn chat_stream(&self, turns: &[ChatTurn]) -> Result<GatewayStream, GatewayError> {
        let params = self.chat_params();
        let mut last_detail = String::new();

        for (model, breaker) in self.chat_stages() {
            match self
                .run_stage(breaker, || self.provider.chat_stream(model, turns, &params))
                .await
            {
                Ok(upstream) => {
                    return Ok(self.pump_stream(upstream, breaker.clone(), turns));
                }
                Err(StageError::Open(_)) => {
                    debug!(model, "stream stage skipped: breaker open");
                    last_detail = format!("{model}: breaker open");
                }
                Err(StageError::Failed(failure)) => match failure.kind {
                    FailureKind::Transient => {
                        warn!(model, "stream stage exhausted: {}", failure.message);
                        last_detail = failure.message;
                    }
                    FailureKind::Policy => {
                        return Err(GatewayError::PolicyRejection {
                            message: failure.message,
                        });
                    }
                    FailureKind::Invalid => {
                        return Err(GatewayError::InvalidRequest {
                            message: failure.message,
                        });
                    }
                },
            }
        }

        Err(GatewayError::UpstreamUnavailable {
            message: last_detail,
        })
    }

    fn chat_stages(&self) -> [(&str, &Arc<CircuitBreaker>); 2] {
        [
            (self.models.primary_chat.as_str(), &self.chat_primary),
            (self.models.secondary_chat.as_str(), &self.chat_secondary),
        ]
    }

    fn estimate_usage(&self, turns: &[ChatTurn], completion: &str) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self
                .counter
                .count_messages(turns.iter().map(|t| t.content.as_str()))
                as u32,
            completion_tokens: self.counter.count(completion) as u32,
        }
    }

    fn pump_stream(
        &self,
        mut upstream: ProviderTokenStream,
        breaker: Arc<CircuitBreaker>,
        turns: &[ChatTurn],
    ) -> GatewayStream {
        let (tx, rx) = mpsc::channel::<StreamItem>(32);
        let prompt_tokens = self
            .counter
            .count_messages(turns.iter().map(|t| t.content.as_str())) as u32;
        let counter = self.counter.clone();

        tokio::spawn(async move {
            let mut assembled = String::new();

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(token) => {
                        assembled.push_str(&token);
                        if tx.send(StreamItem::Token(token)).await.is_err() {
                            // Consumer detached: dropping `upstream` cancels
                            // the provider request. The turn is abandoned.
                            debug!("stream consumer detached, cancelling upstream");
                            return;
                        }
                    }
                    Err(failure) => {
                        breaker.record_failure();
                        let _ = tx
                            .send(StreamItem::Error(GatewayError::from_failure(failure)))
                            .await;
                        return;
                    }
                }
            }

            breaker.record_success();
            let usage = TokenUsage {
                prompt_tokens,
                completion_tokens: counter.count(&assembled) as u32,
            };
            let _ = tx.send(StreamItem::Done {
                text: assembled,
                usage,
            })
            .await;
        });

        ReceiverStream::new(rx)
    }

    /// Runs one breaker-guarded, retried operation against a single stage.
    ///
    /// Retries stop early if the breaker trips open mid-loop; policy and
    /// invalid-request failures are returned without retrying.
    async fn run_stage<T, F, Fut>(
        &self,
        breaker: &CircuitBreaker,
        mut op: F,
    ) -> Result<T, StageError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderFailure>>,
    {
        breaker.try_acquire().map_err(StageError::Open)?;

        let mut attempt = 1u32;
        loop {
            match op().await {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(failure) if failure.kind == FailureKind::Transient => {
                    breaker.record_failure();

                    if attempt >= self.retry.max_attempts
                        || breaker.state() == BreakerState::Open
                    {
                        return Err(StageError::Failed(failure));
                    }

                    let delay = retry::backoff_delay(&self.retry, attempt);
                    debug!(
                        breaker = breaker.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => {
                    // Policy/invalid outcomes are not dependency failures;
                    // they leave the breaker untouched.
                    return Err(StageError::Failed(failure));
                }
            }
        }
    }
}

fn stage_to_gateway_error(err: StageError) -> GatewayError {
    match err {
        StageError::Open(open) => GatewayError::UpstreamUnavailable {
            message: format!("breaker open, retry in {:?}", open.retry_in),
        },
        StageError::Failed(failure) => GatewayError::from_failure(failure),
    }
}
