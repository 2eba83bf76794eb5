//! Cross-cutting, shared constants.
//!
//! These are the tuning defaults for the whole pipeline. Runtime overrides
//! come from [`crate::config::Config`]; prefer deriving secondary values from
//! primary ones to avoid drift.

/// Token budget for a conversation's in-flight context (summary + messages).
pub const DEFAULT_MAX_CONTEXT_TOKENS: usize = 4_000;

/// Target chunk size, in tokens, for the recursive splitter.
pub const DEFAULT_CHUNK_SIZE_TOKENS: usize = 800;

/// Token overlap carried between adjacent chunks.
pub const DEFAULT_CHUNK_OVERLAP_TOKENS: usize = 150;

/// Candidates fetched from the vector index per query.
pub const DEFAULT_K_RETRIEVE: usize = 8;

/// Chunks kept for prompt assembly after score filtering.
pub const DEFAULT_K_CONTEXT: usize = 4;

/// Minimum similarity for a retrieved chunk to enter the context.
pub const DEFAULT_SCORE_KEEP: f32 = 0.5;

/// Below this top score the query is treated as having no context at all.
pub const DEFAULT_SCORE_NO_CONTEXT: f32 = 0.35;

/// Confidence threshold under which a turn is escalated for review.
///
/// The boundary is exclusive: a turn at exactly this confidence is not
/// escalated.
pub const DEFAULT_REVIEW_THRESHOLD: f32 = 0.5;

/// Minimum cosine similarity for a semantic cache hit.
pub const DEFAULT_CACHE_HIT_THRESHOLD: f32 = 0.93;

/// Minimum confidence for a response to be written to the semantic cache.
pub const DEFAULT_CACHEABLE_CONFIDENCE: f32 = 0.7;

/// Semantic cache entry time-to-live.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;

/// Consecutive failures that trip a circuit breaker.
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Window within which breaker failures are counted.
pub const DEFAULT_BREAKER_WINDOW_SECS: u64 = 60;

/// How long a tripped breaker rejects before admitting a probe.
pub const DEFAULT_BREAKER_OPEN_SECS: u64 = 30;

/// Base delay for exponential backoff.
pub const DEFAULT_RETRY_BASE_MS: u64 = 500;

/// Backoff delay cap.
pub const DEFAULT_RETRY_CAP_MS: u64 = 8_000;

/// Maximum attempts per fallback stage (first try included).
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;

/// Per-tenant request budget, per minute.
pub const DEFAULT_TENANT_REQUESTS_PER_MINUTE: u32 = 60;

/// Per-source-IP request budget, per minute.
pub const DEFAULT_IP_REQUESTS_PER_MINUTE: u32 = 120;

/// Retrieval stage deadline.
pub const DEFAULT_RETRIEVE_DEADLINE_MS: u64 = 2_000;

/// Generation stage deadline.
pub const DEFAULT_GENERATE_DEADLINE_MS: u64 = 20_000;

/// Evaluation stage deadline.
pub const DEFAULT_EVALUATE_DEADLINE_MS: u64 = 1_000;

/// Longest accepted chat message, in characters.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 4_000;

/// Default listing page size for `/conversations/{tenant_id}`.
pub const DEFAULT_CONVERSATION_LIMIT: usize = 50;

/// Hard cap on the `limit` query parameter.
pub const MAX_CONVERSATION_LIMIT: usize = 200;

/// Embedding width produced by the default embedding model.
pub const DEFAULT_EMBEDDING_DIM: usize = 1536;

/// Corpus collection name in the vector store.
pub const CORPUS_COLLECTION_NAME: &str = "docent_corpus";

/// Cache collection name; kept distinct from the corpus namespace.
pub const CACHE_COLLECTION_NAME: &str = "docent_cache";
