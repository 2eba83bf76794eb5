//! Environment configuration.
//!
//! Every tuning knob of the pipeline is runtime-configurable through a
//! `DOCENT_*` variable; defaults live on the `Default` impls and mirror
//! [`crate::constants`].

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;
use std::net::IpAddr;
use std::time::Duration;

use crate::constants::*;

/// Default Qdrant gRPC endpoint.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port.
    pub port: u16,
    /// HTTP bind address.
    pub bind_addr: IpAddr,
    /// Qdrant endpoint.
    pub qdrant_url: String,
    /// Model and provider endpoints.
    pub models: ModelConfig,
    /// Splitter tuning.
    pub chunking: ChunkingConfig,
    /// Retrieval fan-out and score thresholds.
    pub retrieval: RetrievalConfig,
    /// Conversation memory budget.
    pub memory: MemoryConfig,
    /// Semantic cache thresholds and TTL.
    pub cache: CacheConfig,
    /// Circuit breaker tuning.
    pub breaker: BreakerConfig,
    /// Retry/backoff tuning.
    pub retry: RetryConfig,
    /// Rate-limit budgets.
    pub limits: RateLimitConfig,
    /// Per-stage deadlines.
    pub deadlines: DeadlineConfig,
    /// Endpoint-layer behavior.
    pub server: ServerConfig,
    /// Confidence threshold (exclusive) under which turns are escalated.
    pub review_threshold: f32,
    /// Ingestion behavior under a tripped gateway breaker.
    ///
    /// `false` (default): fail the upload fast with a `failed` record.
    /// `true`: wait for the breaker's open interval once before giving up.
    pub ingest_queue_on_breaker_open: bool,
}

/// Model names and provider endpoints used by the gateway.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Primary chat model.
    pub primary_chat: String,
    /// Secondary chat model (different provider/family), tried on
    /// transient primary failure.
    pub secondary_chat: String,
    /// Embedding model name.
    pub embedding: String,
    /// Base URL of the OpenAI-compatible embedding endpoint.
    pub embedding_base_url: String,
    /// Speech-to-text model name.
    pub transcription: String,
    /// Base URL of the OpenAI-compatible transcription endpoint.
    pub transcription_base_url: String,
    /// API key for the embedding/transcription endpoints.
    pub api_key: Option<String>,
    /// Sampling temperature for generation.
    pub temperature: f64,
    /// Completion token cap.
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            primary_chat: "gpt-4o-mini".to_string(),
            secondary_chat: "claude-3-5-haiku-latest".to_string(),
            embedding: "text-embedding-3-small".to_string(),
            embedding_base_url: "https://api.openai.com/v1".to_string(),
            transcription: "whisper-1".to_string(),
            transcription_base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            temperature: 0.1,
            max_tokens: 1_024,
        }
    }
}

/// Recursive splitter tuning.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens.
    pub chunk_size: usize,
    /// Token overlap between adjacent chunks.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE_TOKENS,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP_TOKENS,
        }
    }
}

/// Retrieval fan-out and score thresholds.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index.
    pub k_retrieve: usize,
    /// Chunks kept for the prompt.
    pub k_context: usize,
    /// Minimum score for a chunk to be kept.
    pub score_keep: f32,
    /// Top score under which the context is treated as empty.
    pub score_no_context: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_retrieve: DEFAULT_K_RETRIEVE,
            k_context: DEFAULT_K_CONTEXT,
            score_keep: DEFAULT_SCORE_KEEP,
            score_no_context: DEFAULT_SCORE_NO_CONTEXT,
        }
    }
}

/// Conversation memory budget.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Token ceiling over summary + messages.
    pub max_context_tokens: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
        }
    }
}

/// Semantic cache thresholds and TTL.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Minimum similarity for a hit.
    pub hit_threshold: f32,
    /// Minimum confidence for a store.
    pub cacheable_confidence: f32,
    /// Entry time-to-live.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hit_threshold: DEFAULT_CACHE_HIT_THRESHOLD,
            cacheable_confidence: DEFAULT_CACHEABLE_CONFIDENCE,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
        }
    }
}

/// Circuit breaker tuning, applied per external dependency.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Window within which failures are counted.
    pub window: Duration,
    /// Rejection interval before a half-open probe.
    pub open_for: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            window: Duration::from_secs(DEFAULT_BREAKER_WINDOW_SECS),
            open_for: Duration::from_secs(DEFAULT_BREAKER_OPEN_SECS),
        }
    }
}

/// Retry/backoff tuning for transient upstream failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Base backoff delay.
    pub base: Duration,
    /// Backoff delay cap.
    pub cap: Duration,
    /// Maximum attempts per fallback stage.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            cap: Duration::from_millis(DEFAULT_RETRY_CAP_MS),
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
        }
    }
}

/// Rate-limit budgets, per minute.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Per-tenant budget.
    pub tenant_per_minute: u32,
    /// Per-source-IP budget.
    pub ip_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tenant_per_minute: DEFAULT_TENANT_REQUESTS_PER_MINUTE,
            ip_per_minute: DEFAULT_IP_REQUESTS_PER_MINUTE,
        }
    }
}

/// Hard deadlines per agent stage.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineConfig {
    /// Retrieval stage (embed + search).
    pub retrieve: Duration,
    /// Generation stage.
    pub generate: Duration,
    /// Evaluation stage.
    pub evaluate: Duration,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            retrieve: Duration::from_millis(DEFAULT_RETRIEVE_DEADLINE_MS),
            generate: Duration::from_millis(DEFAULT_GENERATE_DEADLINE_MS),
            evaluate: Duration::from_millis(DEFAULT_EVALUATE_DEADLINE_MS),
        }
    }
}

/// Endpoint-layer behavior.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Longest accepted chat message.
    pub max_message_chars: usize,
    /// Accept caller-supplied tenant ids when no verified identity is
    /// present (anonymous demo scope).
    pub allow_anonymous_tenant: bool,
    /// Skip the chat model entirely when retrieval produced no context.
    pub skip_generation_on_empty_context: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            allow_anonymous_tenant: true,
            skip_generation_on_empty_context: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            models: ModelConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            memory: MemoryConfig::default(),
            cache: CacheConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            limits: RateLimitConfig::default(),
            deadlines: DeadlineConfig::default(),
            server: ServerConfig::default(),
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            ingest_queue_on_breaker_open: false,
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "DOCENT_PORT";
    const ENV_BIND_ADDR: &'static str = "DOCENT_BIND_ADDR";
    const ENV_QDRANT_URL: &'static str = "DOCENT_QDRANT_URL";

    const ENV_PRIMARY_CHAT: &'static str = "DOCENT_PRIMARY_CHAT_MODEL";
    const ENV_SECONDARY_CHAT: &'static str = "DOCENT_SECONDARY_CHAT_MODEL";
    const ENV_EMBEDDING_MODEL: &'static str = "DOCENT_EMBEDDING_MODEL";
    const ENV_EMBEDDING_URL: &'static str = "DOCENT_EMBEDDING_BASE_URL";
    const ENV_TRANSCRIPTION_MODEL: &'static str = "DOCENT_TRANSCRIPTION_MODEL";
    const ENV_TRANSCRIPTION_URL: &'static str = "DOCENT_TRANSCRIPTION_BASE_URL";
    const ENV_API_KEY: &'static str = "OPENAI_API_KEY";
    const ENV_TEMPERATURE: &'static str = "DOCENT_TEMPERATURE";
    const ENV_MAX_TOKENS: &'static str = "DOCENT_MAX_COMPLETION_TOKENS";

    const ENV_CHUNK_SIZE: &'static str = "DOCENT_CHUNK_SIZE";
    const ENV_CHUNK_OVERLAP: &'static str = "DOCENT_CHUNK_OVERLAP";

    const ENV_K_RETRIEVE: &'static str = "DOCENT_K_RETRIEVE";
    const ENV_K_CONTEXT: &'static str = "DOCENT_K_CONTEXT";
    const ENV_SCORE_KEEP: &'static str = "DOCENT_SCORE_KEEP";
    const ENV_SCORE_NO_CONTEXT: &'static str = "DOCENT_SCORE_NO_CONTEXT";
    const ENV_REVIEW_THRESHOLD: &'static str = "DOCENT_REVIEW_THRESHOLD";

    const ENV_MAX_CONTEXT_TOKENS: &'static str = "DOCENT_MAX_CONTEXT_TOKENS";

    const ENV_CACHE_HIT: &'static str = "DOCENT_CACHE_HIT_THRESHOLD";
    const ENV_CACHEABLE: &'static str = "DOCENT_CACHEABLE_CONFIDENCE";
    const ENV_CACHE_TTL: &'static str = "DOCENT_CACHE_TTL_SECS";

    const ENV_BREAKER_FAILURES: &'static str = "DOCENT_BREAKER_FAILURES";
    const ENV_BREAKER_WINDOW: &'static str = "DOCENT_BREAKER_WINDOW_SECS";
    const ENV_BREAKER_OPEN: &'static str = "DOCENT_BREAKER_OPEN_SECS";

    const ENV_RETRY_BASE_MS: &'static str = "DOCENT_RETRY_BASE_MS";
    const ENV_RETRY_CAP_MS: &'static str = "DOCENT_RETRY_CAP_MS";
    const ENV_RETRY_ATTEMPTS: &'static str = "DOCENT_RETRY_MAX_ATTEMPTS";

    const ENV_TENANT_RPM: &'static str = "DOCENT_TENANT_REQUESTS_PER_MINUTE";
    const ENV_IP_RPM: &'static str = "DOCENT_IP_REQUESTS_PER_MINUTE";

    const ENV_RETRIEVE_DEADLINE: &'static str = "DOCENT_RETRIEVE_DEADLINE_MS";
    const ENV_GENERATE_DEADLINE: &'static str = "DOCENT_GENERATE_DEADLINE_MS";
    const ENV_EVALUATE_DEADLINE: &'static str = "DOCENT_EVALUATE_DEADLINE_MS";

    const ENV_MAX_MESSAGE_CHARS: &'static str = "DOCENT_MAX_MESSAGE_CHARS";
    const ENV_ALLOW_ANONYMOUS: &'static str = "DOCENT_ALLOW_ANONYMOUS_TENANT";
    const ENV_SKIP_EMPTY_GENERATION: &'static str = "DOCENT_SKIP_GENERATION_ON_EMPTY_CONTEXT";
    const ENV_INGEST_QUEUE: &'static str = "DOCENT_INGEST_QUEUE_ON_BREAKER_OPEN";

    /// Reads the full configuration from the environment, falling back to
    /// defaults per field.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;
        let qdrant_url = parse_string_or(Self::ENV_QDRANT_URL, defaults.qdrant_url);

        let model_defaults = ModelConfig::default();
        let models = ModelConfig {
            primary_chat: parse_string_or(Self::ENV_PRIMARY_CHAT, model_defaults.primary_chat),
            secondary_chat: parse_string_or(
                Self::ENV_SECONDARY_CHAT,
                model_defaults.secondary_chat,
            ),
            embedding: parse_string_or(Self::ENV_EMBEDDING_MODEL, model_defaults.embedding),
            embedding_base_url: parse_string_or(
                Self::ENV_EMBEDDING_URL,
                model_defaults.embedding_base_url,
            ),
            transcription: parse_string_or(
                Self::ENV_TRANSCRIPTION_MODEL,
                model_defaults.transcription,
            ),
            transcription_base_url: parse_string_or(
                Self::ENV_TRANSCRIPTION_URL,
                model_defaults.transcription_base_url,
            ),
            api_key: env::var(Self::ENV_API_KEY).ok().filter(|v| !v.is_empty()),
            temperature: parse_f64_or(Self::ENV_TEMPERATURE, model_defaults.temperature),
            max_tokens: parse_u32_or(Self::ENV_MAX_TOKENS, model_defaults.max_tokens),
        };

        let chunking = ChunkingConfig {
            chunk_size: parse_usize_or(Self::ENV_CHUNK_SIZE, DEFAULT_CHUNK_SIZE_TOKENS),
            chunk_overlap: parse_usize_or(Self::ENV_CHUNK_OVERLAP, DEFAULT_CHUNK_OVERLAP_TOKENS),
        };

        let retrieval = RetrievalConfig {
            k_retrieve: parse_usize_or(Self::ENV_K_RETRIEVE, DEFAULT_K_RETRIEVE),
            k_context: parse_usize_or(Self::ENV_K_CONTEXT, DEFAULT_K_CONTEXT),
            score_keep: parse_f32_or(Self::ENV_SCORE_KEEP, DEFAULT_SCORE_KEEP),
            score_no_context: parse_f32_or(Self::ENV_SCORE_NO_CONTEXT, DEFAULT_SCORE_NO_CONTEXT),
        };

        let memory = MemoryConfig {
            max_context_tokens: parse_usize_or(
                Self::ENV_MAX_CONTEXT_TOKENS,
                DEFAULT_MAX_CONTEXT_TOKENS,
            ),
        };

        let cache = CacheConfig {
            hit_threshold: parse_f32_or(Self::ENV_CACHE_HIT, DEFAULT_CACHE_HIT_THRESHOLD),
            cacheable_confidence: parse_f32_or(Self::ENV_CACHEABLE, DEFAULT_CACHEABLE_CONFIDENCE),
            ttl: Duration::from_secs(parse_u64_or(Self::ENV_CACHE_TTL, DEFAULT_CACHE_TTL_SECS)),
        };

        let breaker = BreakerConfig {
            failure_threshold: parse_u32_or(
                Self::ENV_BREAKER_FAILURES,
                DEFAULT_BREAKER_FAILURE_THRESHOLD,
            ),
            window: Duration::from_secs(parse_u64_or(
                Self::ENV_BREAKER_WINDOW,
                DEFAULT_BREAKER_WINDOW_SECS,
            )),
            open_for: Duration::from_secs(parse_u64_or(
                Self::ENV_BREAKER_OPEN,
                DEFAULT_BREAKER_OPEN_SECS,
            )),
        };

        let retry = RetryConfig {
            base: Duration::from_millis(parse_u64_or(Self::ENV_RETRY_BASE_MS, DEFAULT_RETRY_BASE_MS)),
            cap: Duration::from_millis(parse_u64_or(Self::ENV_RETRY_CAP_MS, DEFAULT_RETRY_CAP_MS)),
            max_attempts: parse_u32_or(Self::ENV_RETRY_ATTEMPTS, DEFAULT_RETRY_MAX_ATTEMPTS),
        };

        let limits = RateLimitConfig {
            tenant_per_minute: parse_u32_or(
                Self::ENV_TENANT_RPM,
                DEFAULT_TENANT_REQUESTS_PER_MINUTE,
            ),
            ip_per_minute: parse_u32_or(Self::ENV_IP_RPM, DEFAULT_IP_REQUESTS_PER_MINUTE),
        };

        let deadlines = DeadlineConfig {
            retrieve: Duration::from_millis(parse_u64_or(
                Self::ENV_RETRIEVE_DEADLINE,
                DEFAULT_RETRIEVE_DEADLINE_MS,
            )),
            generate: Duration::from_millis(parse_u64_or(
                Self::ENV_GENERATE_DEADLINE,
                DEFAULT_GENERATE_DEADLINE_MS,
            )),
            evaluate: Duration::from_millis(parse_u64_or(
                Self::ENV_EVALUATE_DEADLINE,
                DEFAULT_EVALUATE_DEADLINE_MS,
            )),
        };

        let server_defaults = ServerConfig::default();
        let server = ServerConfig {
            max_message_chars: parse_usize_or(
                Self::ENV_MAX_MESSAGE_CHARS,
                DEFAULT_MAX_MESSAGE_CHARS,
            ),
            allow_anonymous_tenant: parse_bool_or(
                Self::ENV_ALLOW_ANONYMOUS,
                server_defaults.allow_anonymous_tenant,
            ),
            skip_generation_on_empty_context: parse_bool_or(
                Self::ENV_SKIP_EMPTY_GENERATION,
                server_defaults.skip_generation_on_empty_context,
            ),
        };

        let review_threshold = parse_f32_or(Self::ENV_REVIEW_THRESHOLD, DEFAULT_REVIEW_THRESHOLD);
        let ingest_queue_on_breaker_open = parse_bool_or(Self::ENV_INGEST_QUEUE, false);

        let config = Self {
            port,
            bind_addr,
            qdrant_url,
            models,
            chunking,
            retrieval,
            memory,
            cache,
            breaker,
            retry,
            limits,
            deadlines,
            server,
            review_threshold,
            ingest_queue_on_breaker_open,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("score_keep", self.retrieval.score_keep),
            ("score_no_context", self.retrieval.score_no_context),
            ("cache_hit_threshold", self.cache.hit_threshold),
            ("cacheable_confidence", self.cache.cacheable_confidence),
            ("review_threshold", self.review_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                overlap: self.chunking.chunk_overlap,
                size: self.chunking.chunk_size,
            });
        }

        if self.retrieval.k_context > self.retrieval.k_retrieve {
            return Err(ConfigError::ContextExceedsRetrieve {
                k_context: self.retrieval.k_context,
                k_retrieve: self.retrieval.k_retrieve,
            });
        }

        if self.retrieval.k_retrieve == 0 {
            return Err(ConfigError::MustBeNonZero { name: "k_retrieve" });
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::MustBeNonZero { name: "retry.max_attempts" });
        }
        if self.limits.tenant_per_minute == 0 || self.limits.ip_per_minute == 0 {
            return Err(ConfigError::MustBeNonZero { name: "rate limit budget" });
        }

        Ok(())
    }

    /// Formatted bind address.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;

                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }

                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }
}

fn parse_string_or(var_name: &str, default: String) -> String {
    env::var(var_name).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn parse_usize_or(var_name: &str, default: usize) -> usize {
    env::var(var_name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_u64_or(var_name: &str, default: u64) -> u64 {
    env::var(var_name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_u32_or(var_name: &str, default: u32) -> u32 {
    env::var(var_name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_f32_or(var_name: &str, default: f32) -> f32 {
    env::var(var_name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_f64_or(var_name: &str, default: f64) -> f64 {
    env::var(var_name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_bool_or(var_name: &str, default: bool) -> bool {
    env::var(var_name)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}
