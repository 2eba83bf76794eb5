//! Per-tenant vector index over document chunks, plus the semantic cache's
//! sibling namespace.
//!
//! Tenancy is a correctness property here: every search carries a mandatory
//! tenant filter, and a result from another tenant is a release blocker, not
//! a tuning issue.

pub mod client;
pub mod error;
pub mod model;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use client::{QdrantIndex, VectorIndex};
pub use error::VectorDbError;
#[cfg(any(test, feature = "mock"))]
pub use mock::{MockVectorIndex, cosine_similarity};
pub use model::{
    CacheRecord, ChunkMetadata, Citation, ContentType, DocumentChunk, ScoredCacheRecord,
    ScoredChunk, clamp_score, sort_scored_chunks,
};
