use std::time::Duration;

use tokio_stream::StreamExt;

use super::*;
use crate::config::{BreakerConfig, ModelConfig, RetryConfig};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        base: Duration::from_millis(1),
        cap: Duration::from_millis(4),
        max_attempts: 3,
    }
}

fn fast_breaker() -> BreakerConfig {
    BreakerConfig {
        failure_threshold: 5,
        window: Duration::from_secs(60),
        open_for: Duration::from_millis(50),
    }
}

fn gateway(provider: MockProvider) -> ModelGateway<MockProvider> {
    ModelGateway::new(provider, ModelConfig::default(), fast_breaker(), fast_retry())
}

fn user_turns(text: &str) -> Vec<ChatTurn> {
    vec![ChatTurn::user(text)]
}

#[tokio::test]
async fn chat_returns_provider_content() {
    let provider = MockProvider::new().with_chat_response("The export lives under File.");
    let gw = gateway(provider);

    let output = gw.chat(&user_turns("How do I export?")).await.unwrap();
    assert_eq!(output.content, "The export lives under File.");
    assert!(output.usage.total() > 0);
}

#[tokio::test]
async fn transient_primary_failure_falls_back_to_secondary() {
    let models = ModelConfig::default();
    let provider = MockProvider::new()
        .with_chat_failures(
            models.primary_chat.clone(),
            ProviderFailure::transient("503 from primary"),
            3,
        )
        .with_chat_response("answer from secondary");
    let gw = gateway(provider);

    let output = gw.chat(&user_turns("hi")).await.unwrap();
    assert_eq!(output.content, "answer from secondary");
    // Three retries on primary plus one successful secondary call.
    assert_eq!(gw.provider().chat_calls(), 4);
}

#[tokio::test]
async fn policy_rejection_never_advances_the_chain() {
    let models = ModelConfig::default();
    let provider = MockProvider::new()
        .with_chat_failures(
            models.primary_chat.clone(),
            ProviderFailure::policy("content refused"),
            1,
        )
        .with_chat_response("should never be returned");
    let gw = gateway(provider);

    let err = gw.chat(&user_turns("hi")).await.unwrap_err();
    assert!(matches!(err, GatewayError::PolicyRejection { .. }));
    assert_eq!(gw.provider().chat_calls(), 1);
}

#[tokio::test]
async fn invalid_request_is_not_retried() {
    let models = ModelConfig::default();
    let provider = MockProvider::new().with_chat_failures(
        models.primary_chat.clone(),
        ProviderFailure::invalid("401 bad key"),
        1,
    );
    let gw = gateway(provider);

    let err = gw.chat(&user_turns("hi")).await.unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest { .. }));
    assert_eq!(gw.provider().chat_calls(), 1);
}

#[tokio::test]
async fn exhausted_chain_reports_unavailable_and_breaker_opens() {
    let models = ModelConfig::default();
    let provider = MockProvider::new()
        .with_chat_failures(
            models.primary_chat.clone(),
            ProviderFailure::transient("primary down"),
            8,
        )
        .with_chat_failures(
            models.secondary_chat.clone(),
            ProviderFailure::transient("secondary down"),
            8,
        );
    let gw = gateway(provider);

    let err = gw.chat(&user_turns("hi")).await.unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamUnavailable { .. }));

    // A second request finds the primary breaker already counting failures;
    // after enough, the stage is skipped outright.
    let _ = gw.chat(&user_turns("hi again")).await;
    let health = gw.health();
    assert_eq!(health.chat_primary, BreakerState::Open);
}

#[tokio::test]
async fn open_breaker_rejects_without_calling_provider() {
    let models = ModelConfig::default();
    let provider = MockProvider::new()
        .with_chat_failures(
            models.primary_chat.clone(),
            ProviderFailure::transient("down"),
            100,
        )
        .with_chat_failures(
            models.secondary_chat.clone(),
            ProviderFailure::transient("down"),
            100,
        );
    let gw = gateway(provider);

    // Trip both breakers.
    for _ in 0..3 {
        let _ = gw.chat(&user_turns("x")).await;
    }
    assert_eq!(gw.health().chat_primary, BreakerState::Open);
    assert_eq!(gw.health().chat_secondary, BreakerState::Open);

    let calls_before = gw.provider().chat_calls();
    let err = gw.chat(&user_turns("x")).await.unwrap_err();
    assert!(matches!(err, GatewayError::UpstreamUnavailable { .. }));
    assert_eq!(gw.provider().chat_calls(), calls_before);
}

#[tokio::test]
async fn stream_emits_tokens_then_single_done_with_assembled_text() {
    let provider = MockProvider::new().with_chat_response("one two three");
    let gw = gateway(provider);

    let mut stream = gw.chat_stream(&user_turns("count")).await.unwrap();

    let mut tokens = String::new();
    let mut done = None;
    let mut done_count = 0;
    while let Some(item) = stream.next().await {
        match item {
            StreamItem::Token(t) => tokens.push_str(&t),
            StreamItem::Done { text, usage } => {
                done_count += 1;
                done = Some((text, usage));
            }
            StreamItem::Error(e) => panic!("unexpected stream error: {e}"),
        }
    }

    assert_eq!(done_count, 1);
    let (text, usage) = done.unwrap();
    assert_eq!(text, "one two three");
    assert_eq!(tokens, text);
    assert!(usage.completion_tokens > 0);
}

#[tokio::test]
async fn embed_preserves_input_order_and_determinism() {
    let gw = gateway(MockProvider::new());

    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let first = gw.embed(&texts).await.unwrap();
    let second = gw.embed(&texts).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(first[0].len(), MOCK_EMBEDDING_DIM);
    assert_eq!(first, second);
    assert_ne!(first[0], first[1]);
}

#[tokio::test]
async fn embed_retries_transient_failures() {
    let provider = MockProvider::new()
        .with_embed_failures(ProviderFailure::transient("429"), 2);
    let gw = gateway(provider);

    let vectors = gw.embed(&["text".to_string()]).await.unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(gw.provider().embed_calls(), 3);
}

#[tokio::test]
async fn transcribe_returns_text() {
    let provider = MockProvider::new().with_transcript("lesson three covers exporting");
    let gw = gateway(provider);

    let text = gw.transcribe("lesson3.mp4", vec![1, 2, 3]).await.unwrap();
    assert_eq!(text, "lesson three covers exporting");
}

#[tokio::test]
async fn empty_embed_batch_short_circuits() {
    let gw = gateway(MockProvider::new());
    let vectors = gw.embed(&[]).await.unwrap();
    assert!(vectors.is_empty());
    assert_eq!(gw.provider().embed_calls(), 0);
}
