//! In-memory vector index for tests and examples.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::client::VectorIndex;
use super::error::VectorDbError;
use super::model::{
    CacheRecord, DocumentChunk, ScoredCacheRecord, ScoredChunk, clamp_score, sort_scored_chunks,
};
use crate::hashing::{cache_point_id, chunk_point_id};

/// Brute-force cosine index, tenant-filtered like the real one.
#[derive(Default)]
pub struct MockVectorIndex {
    chunks: RwLock<HashMap<u64, DocumentChunk>>,
    cache: RwLock<HashMap<u64, (Vec<f32>, CacheRecord)>>,
}

impl MockVectorIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored corpus points.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Number of stored cache points.
    pub fn cache_count(&self) -> usize {
        self.cache.read().len()
    }
}

/// Plain cosine similarity; zero for mismatched or empty inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

impl VectorIndex for MockVectorIndex {
    async fn ensure_collections(&self, _vector_size: u64) -> Result<(), VectorDbError> {
        Ok(())
    }

    async fn upsert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<(), VectorDbError> {
        let mut store = self.chunks.write();
        for chunk in chunks {
            let id = chunk_point_id(
                &chunk.metadata.tenant_id,
                &chunk.metadata.source,
                chunk.metadata.chunk_index,
            );
            store.insert(id, chunk);
        }
        Ok(())
    }

    async fn search_chunks(
        &self,
        tenant_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<ScoredChunk>, VectorDbError> {
        let store = self.chunks.read();

        let mut results: Vec<ScoredChunk> = store
            .values()
            .filter(|c| c.metadata.tenant_id == tenant_id)
            .map(|c| ScoredChunk {
                score: clamp_score(cosine_similarity(&query, &c.embedding)),
                text: c.text.clone(),
                metadata: c.metadata.clone(),
            })
            .collect();

        sort_scored_chunks(&mut results);
        results.truncate(limit as usize);
        Ok(results)
    }

    async fn upsert_cache_record(
        &self,
        vector: Vec<f32>,
        record: CacheRecord,
    ) -> Result<(), VectorDbError> {
        let id = cache_point_id(&record.tenant_id, &record.query_text);
        self.cache.write().insert(id, (vector, record));
        Ok(())
    }

    async fn search_cache(
        &self,
        tenant_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<ScoredCacheRecord>, VectorDbError> {
        let store = self.cache.read();

        let mut results: Vec<ScoredCacheRecord> = store
            .values()
            .filter(|(_, r)| r.tenant_id == tenant_id)
            .map(|(vector, record)| ScoredCacheRecord {
                score: clamp_score(cosine_similarity(&query, vector)),
                record: record.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit as usize);
        Ok(results)
    }

    async fn health_check(&self) -> Result<(), VectorDbError> {
        Ok(())
    }
}
