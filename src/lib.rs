//! # Docent
//!
//! Tenant-scoped retrieval-augmented answering over a creator's private
//! course material.
//!
//! Docent sits between a student-facing client and the model providers:
//!
//! ```text
//! Upload → Extract → Chunk → Embed → Vector index (per-tenant namespace)
//! Query  → Guard → Retrieve → Generate → Evaluate → Answer + citations
//! ```
//!
//! Answers are grounded in retrieved passages, carry source citations, and
//! are scored for confidence so weak answers can be escalated for human
//! review instead of shipped silently.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docent::config::Config;
//!
//! # fn run() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! println!("Listening on {}", config.socket_addr());
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock` | In-process provider and index doubles for tests/examples |
//!
//! ## Modules
//!
//! - [`gateway`] - Circuit-broken front door to chat/embedding/STT providers
//! - [`vectordb`] - Qdrant-backed tenant-scoped chunk index
//! - [`ingest`] - Extraction, chunking, embedding, indexing
//! - [`agent`] - The staged Guard → Retrieve → Generate → Evaluate agent
//! - [`cache`] - Semantic response cache with generation invalidation
//! - [`memory`] - Token-bounded conversation memory with summarization
//! - [`server`] - Axum HTTP surface

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod agent;
pub mod cache;
pub mod config;
pub mod constants;
pub mod evaluate;
pub mod gateway;
pub mod guard;
pub mod hashing;
pub mod ingest;
pub mod limiter;
pub mod memory;
pub mod persistence;
pub mod server;
pub mod tokens;
pub mod vectordb;

pub use agent::{AgentError, AgentEvent, AgentRequest, RagAgent, TurnOutcome};
pub use cache::{CacheHit, SemanticCache};
pub use config::{Config, ConfigError};
pub use evaluate::{Evaluation, FlagKind, HallucinationFlag, ResponseEvaluator};
pub use gateway::{
    BreakerState, ChatRole, ChatTurn, GatewayError, GatewayHealth, LiveProvider, ModelGateway,
    ModelProvider,
};
#[cfg(any(test, feature = "mock"))]
pub use gateway::{MOCK_EMBEDDING_DIM, MockProvider};
pub use guard::{GuardVerdict, PromptGuard, ThreatLevel};
pub use hashing::{cache_point_id, chunk_point_id, exact_query_key, hash_tenant_id, hash_to_u64};
pub use ingest::{IngestError, IngestionCoordinator, ProcessError, RecursiveSplitter};
pub use limiter::{LimitScope, RateLimited, RequestRateLimiter};
pub use memory::{ConversationMemory, MemoryMessage, MemoryRegistry, Role, TRUNCATION_MARKER};
pub use persistence::{
    ConversationTurn, InMemoryPersistence, Persistence, PersistenceError, UploadRecord,
    UploadStatus,
};
pub use server::{ApiError, AppState, VERIFIED_TENANT_HEADER, create_router};
pub use tokens::TokenCounter;
#[cfg(any(test, feature = "mock"))]
pub use vectordb::MockVectorIndex;
pub use vectordb::{
    CacheRecord, ChunkMetadata, Citation, ContentType, DocumentChunk, QdrantIndex, ScoredChunk,
    VectorDbError, VectorIndex,
};
