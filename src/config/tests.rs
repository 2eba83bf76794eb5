use super::*;

#[test]
fn default_config_matches_documented_defaults() {
    let config = Config::default();

    assert_eq!(config.port, 8080);
    assert_eq!(config.memory.max_context_tokens, 4_000);
    assert_eq!(config.chunking.chunk_size, 800);
    assert_eq!(config.chunking.chunk_overlap, 150);
    assert_eq!(config.retrieval.k_retrieve, 8);
    assert_eq!(config.retrieval.k_context, 4);
    assert_eq!(config.retrieval.score_keep, 0.5);
    assert_eq!(config.retrieval.score_no_context, 0.35);
    assert_eq!(config.review_threshold, 0.5);
    assert_eq!(config.cache.hit_threshold, 0.93);
    assert_eq!(config.cache.cacheable_confidence, 0.7);
    assert_eq!(config.cache.ttl, Duration::from_secs(3_600));
    assert_eq!(config.breaker.failure_threshold, 5);
    assert_eq!(config.breaker.window, Duration::from_secs(60));
    assert_eq!(config.breaker.open_for, Duration::from_secs(30));
    assert_eq!(config.retry.base, Duration::from_millis(500));
    assert_eq!(config.retry.cap, Duration::from_millis(8_000));
    assert_eq!(config.retry.max_attempts, 4);
    assert_eq!(config.limits.tenant_per_minute, 60);
    assert_eq!(config.limits.ip_per_minute, 120);
    assert_eq!(config.deadlines.retrieve, Duration::from_secs(2));
    assert_eq!(config.deadlines.generate, Duration::from_secs(20));
    assert_eq!(config.deadlines.evaluate, Duration::from_secs(1));
}

#[test]
fn default_config_validates() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn overlap_must_be_smaller_than_chunk_size() {
    let mut config = Config::default();
    config.chunking.chunk_overlap = config.chunking.chunk_size;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge { .. })
    ));
}

#[test]
fn k_context_must_not_exceed_k_retrieve() {
    let mut config = Config::default();
    config.retrieval.k_context = config.retrieval.k_retrieve + 1;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::ContextExceedsRetrieve { .. })
    ));
}

#[test]
fn thresholds_must_be_in_unit_interval() {
    let mut config = Config::default();
    config.cache.hit_threshold = 1.5;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::ThresholdOutOfRange {
            name: "cache_hit_threshold",
            ..
        })
    ));
}

#[test]
fn zero_retry_attempts_rejected() {
    let mut config = Config::default();
    config.retry.max_attempts = 0;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::MustBeNonZero { .. })
    ));
}

#[test]
fn socket_addr_formats_bind_and_port() {
    let config = Config::default();
    assert_eq!(config.socket_addr(), "127.0.0.1:8080");
}
