//! Tenant-scoped semantic response cache.
//!
//! Two tiers: an exact-match L1 keyed on the hashed `(tenant, query)`
//! pair, and a semantic L2 over query embeddings in
//! a cache namespace of the vector index, distinct from the corpus. Entries
//! are stamped with the tenant's corpus generation; ingestion bumps the
//! counter, and stale entries are ignored on lookup rather than eagerly
//! purged.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::config::CacheConfig;
use crate::hashing::exact_query_key;
use crate::vectordb::{CacheRecord, Citation, VectorDbError, VectorIndex};

/// L2 candidates fetched per probe.
const CACHE_PROBE_LIMIT: u64 = 4;

#[derive(Debug)]
struct L1Entry {
    response: String,
    sources: Vec<Citation>,
    confidence: f32,
    generation: u64,
    hit_count: AtomicU64,
}

/// A reusable cached response.
#[derive(Debug, Clone)]
pub struct CacheHit {
    /// Cached response text.
    pub response: String,
    /// Citations stored with the response.
    pub sources: Vec<Citation>,
    /// Confidence recorded at store time.
    pub confidence: f32,
    /// Similarity between probe and stored query (1.0 for exact hits).
    pub score: f32,
    /// Times this entry has been served (exact tier only).
    pub hit_count: u64,
}

/// Semantic cache over a vector index cache namespace.
pub struct SemanticCache<V: VectorIndex> {
    index: Arc<V>,
    exact: moka::sync::Cache<[u8; 32], Arc<L1Entry>>,
    generations: DashMap<String, Arc<AtomicU64>>,
    config: CacheConfig,
}

impl<V: VectorIndex> SemanticCache<V> {
    /// Cache backed by `index`.
    pub fn new(index: Arc<V>, config: CacheConfig) -> Self {
        let exact = moka::sync::Cache::builder()
            .max_capacity(10_000)
            .time_to_live(config.ttl)
            .build();

        Self {
            index,
            exact,
            generations: DashMap::new(),
            config,
        }
    }

    /// Current corpus generation for a tenant.
    pub fn current_generation(&self, tenant_id: &str) -> u64 {
        self.generations
            .get(tenant_id)
            .map(|g| g.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Bumps the tenant's generation, invalidating all earlier entries.
    /// Called after a successful corpus upsert.
    pub fn bump_generation(&self, tenant_id: &str) -> u64 {
        let counter = self
            .generations
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Probes both tiers for a semantically equivalent past answer.
    ///
    /// `query_embedding` is the already-embedded probe query; entries below
    /// the similarity threshold, from an older generation, or past their TTL
    /// are ignored.
    #[instrument(skip(self, query_text, query_embedding), fields(tenant = tenant_id))]
    pub async fn lookup(
        &self,
        tenant_id: &str,
        query_text: &str,
        query_embedding: &[f32],
    ) -> Result<Option<CacheHit>, VectorDbError> {
        let generation = self.current_generation(tenant_id);

        let key = exact_query_key(tenant_id, query_text);
        if let Some(entry) = self.exact.get(&key) {
            if entry.generation == generation {
                let hit_count = entry.hit_count.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("exact cache hit");
                return Ok(Some(CacheHit {
                    response: entry.response.clone(),
                    sources: entry.sources.clone(),
                    confidence: entry.confidence,
                    score: 1.0,
                    hit_count,
                }));
            }
            // Stale generation: leave it for TTL eviction, treat as a miss.
        }

        let candidates = self
            .index
            .search_cache(tenant_id, query_embedding.to_vec(), CACHE_PROBE_LIMIT)
            .await?;

        let now = chrono::Utc::now().timestamp();
        let ttl_secs = self.config.ttl.as_secs() as i64;

        let best = candidates.into_iter().find(|c| {
            c.score >= self.config.hit_threshold
                && c.record.generation == generation
                && now.saturating_sub(c.record.created_at) <= ttl_secs
        });

        match best {
            Some(hit) => {
                debug!(score = hit.score, "semantic cache hit");
                let sources: Vec<Citation> =
                    serde_json::from_str(&hit.record.sources_json).unwrap_or_default();
                Ok(Some(CacheHit {
                    response: hit.record.response,
                    sources,
                    confidence: hit.record.confidence,
                    score: hit.score,
                    hit_count: 0,
                }))
            }
            None => Ok(None),
        }
    }

    /// Stores a response if it clears the cacheability bar. Escalated or
    /// low-confidence responses are never cached. Returns whether a write
    /// happened.
    #[instrument(skip_all, fields(tenant = tenant_id, confidence))]
    pub async fn store(
        &self,
        tenant_id: &str,
        query_text: &str,
        query_embedding: Vec<f32>,
        response: &str,
        sources: &[Citation],
        confidence: f32,
        should_escalate: bool,
    ) -> Result<bool, VectorDbError> {
        if should_escalate || confidence < self.config.cacheable_confidence {
            debug!("response not cacheable");
            return Ok(false);
        }

        let generation = self.current_generation(tenant_id);
        let sources_json = serde_json::to_string(sources).unwrap_or_else(|_| "[]".to_string());

        let record = CacheRecord {
            tenant_id: tenant_id.to_string(),
            query_text: query_text.to_string(),
            response: response.to_string(),
            sources_json,
            confidence,
            generation,
            created_at: chrono::Utc::now().timestamp(),
        };
        self.index
            .upsert_cache_record(query_embedding, record)
            .await?;

        self.exact.insert(
            exact_query_key(tenant_id, query_text),
            Arc::new(L1Entry {
                response: response.to_string(),
                sources: sources.to_vec(),
                confidence,
                generation,
                hit_count: AtomicU64::new(0),
            }),
        );

        Ok(true)
    }
}
