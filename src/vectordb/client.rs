//! Qdrant-backed vector index.

use std::collections::HashMap;

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};

use super::error::VectorDbError;
use super::model::{
    CacheRecord, DocumentChunk, ScoredCacheRecord, ScoredChunk, clamp_score, sort_scored_chunks,
};
use crate::constants::{CACHE_COLLECTION_NAME, CORPUS_COLLECTION_NAME};
use crate::hashing::{cache_point_id, chunk_point_id};

#[derive(Clone)]
/// Qdrant client wrapper holding both the corpus and cache collections.
pub struct QdrantIndex {
    client: Qdrant,
    url: String,
}

impl QdrantIndex {
    /// Creates a client for `url`.
    pub async fn new(url: &str) -> Result<Self, VectorDbError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorDbError::ConnectionFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Configured endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn ensure_collection(&self, name: &str, vector_size: u64) -> Result<(), VectorDbError> {
        let exists = self.client.collection_exists(name).await.map_err(|e| {
            VectorDbError::CreateCollectionFailed {
                collection: name.to_string(),
                message: e.to_string(),
            }
        })?;

        if !exists {
            let vectors_config = VectorParamsBuilder::new(vector_size, Distance::Cosine);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(name)
                        .vectors_config(vectors_config)
                        .on_disk_payload(true),
                )
                .await
                .map_err(|e| VectorDbError::CreateCollectionFailed {
                    collection: name.to_string(),
                    message: e.to_string(),
                })?;
        }

        Ok(())
    }

    fn chunk_point(chunk: DocumentChunk) -> PointStruct {
        let id = chunk_point_id(
            &chunk.metadata.tenant_id,
            &chunk.metadata.source,
            chunk.metadata.chunk_index,
        );

        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("tenant_id".to_string(), chunk.metadata.tenant_id.into());
        payload.insert("source".to_string(), chunk.metadata.source.into());
        payload.insert("title".to_string(), chunk.metadata.title.into());
        payload.insert(
            "content_type".to_string(),
            chunk.metadata.content_type.as_str().into(),
        );
        payload.insert(
            "chunk_index".to_string(),
            (chunk.metadata.chunk_index as i64).into(),
        );
        payload.insert("text".to_string(), chunk.text.into());
        if let Some(page) = chunk.metadata.page_index {
            payload.insert("page_index".to_string(), (page as i64).into());
        }

        PointStruct::new(id, chunk.embedding, payload)
    }

    fn cache_point(vector: Vec<f32>, record: CacheRecord) -> PointStruct {
        let id = cache_point_id(&record.tenant_id, &record.query_text);

        let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
        payload.insert("tenant_id".to_string(), record.tenant_id.into());
        payload.insert("query_text".to_string(), record.query_text.into());
        payload.insert("response".to_string(), record.response.into());
        payload.insert("sources_json".to_string(), record.sources_json.into());
        payload.insert("confidence".to_string(), (record.confidence as f64).into());
        payload.insert("generation".to_string(), (record.generation as i64).into());
        payload.insert("created_at".to_string(), record.created_at.into());

        PointStruct::new(id, vector, payload)
    }

    fn tenant_filter(tenant_id: &str) -> Filter {
        Filter::must([Condition::matches("tenant_id", tenant_id.to_string())])
    }
}

/// Minimal async interface used by retrieval, ingestion, and the semantic
/// cache. Tenancy is enforced inside every search.
pub trait VectorIndex: Send + Sync {
    /// Ensures both collections exist with the given vector width.
    fn ensure_collections(
        &self,
        vector_size: u64,
    ) -> impl std::future::Future<Output = Result<(), VectorDbError>> + Send;

    /// Upserts corpus chunks. Duplicate `(tenant, source, chunk_index)`
    /// replaces the prior point.
    fn upsert_chunks(
        &self,
        chunks: Vec<DocumentChunk>,
    ) -> impl std::future::Future<Output = Result<(), VectorDbError>> + Send;

    /// Searches the tenant's corpus namespace, best score first, ties by
    /// chunk index then source.
    fn search_chunks(
        &self,
        tenant_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> impl std::future::Future<Output = Result<Vec<ScoredChunk>, VectorDbError>> + Send;

    /// Upserts one semantic cache record keyed on `(tenant, query)`.
    fn upsert_cache_record(
        &self,
        vector: Vec<f32>,
        record: CacheRecord,
    ) -> impl std::future::Future<Output = Result<(), VectorDbError>> + Send;

    /// Searches the tenant's cache namespace, best score first.
    fn search_cache(
        &self,
        tenant_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> impl std::future::Future<Output = Result<Vec<ScoredCacheRecord>, VectorDbError>> + Send;

    /// Cheap connectivity probe for `/health`.
    fn health_check(&self) -> impl std::future::Future<Output = Result<(), VectorDbError>> + Send;
}

impl VectorIndex for QdrantIndex {
    async fn ensure_collections(&self, vector_size: u64) -> Result<(), VectorDbError> {
        self.ensure_collection(CORPUS_COLLECTION_NAME, vector_size)
            .await?;
        self.ensure_collection(CACHE_COLLECTION_NAME, vector_size)
            .await
    }

    async fn upsert_chunks(&self, chunks: Vec<DocumentChunk>) -> Result<(), VectorDbError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let points: Vec<PointStruct> = chunks.into_iter().map(Self::chunk_point).collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(CORPUS_COLLECTION_NAME, points).wait(true))
            .await
            .map_err(|e| VectorDbError::UpsertFailed {
                collection: CORPUS_COLLECTION_NAME.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn search_chunks(
        &self,
        tenant_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<ScoredChunk>, VectorDbError> {
        let search = SearchPointsBuilder::new(CORPUS_COLLECTION_NAME, query, limit)
            .with_payload(true)
            .filter(Self::tenant_filter(tenant_id));

        let response =
            self.client
                .search_points(search)
                .await
                .map_err(|e| VectorDbError::SearchFailed {
                    collection: CORPUS_COLLECTION_NAME.to_string(),
                    message: e.to_string(),
                })?;

        let mut results: Vec<ScoredChunk> = response
            .result
            .into_iter()
            .filter_map(ScoredChunk::from_scored_point)
            .collect();
        sort_scored_chunks(&mut results);

        Ok(results)
    }

    async fn upsert_cache_record(
        &self,
        vector: Vec<f32>,
        record: CacheRecord,
    ) -> Result<(), VectorDbError> {
        let point = Self::cache_point(vector, record);

        self.client
            .upsert_points(UpsertPointsBuilder::new(CACHE_COLLECTION_NAME, [point]).wait(true))
            .await
            .map_err(|e| VectorDbError::UpsertFailed {
                collection: CACHE_COLLECTION_NAME.to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }

    async fn search_cache(
        &self,
        tenant_id: &str,
        query: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<ScoredCacheRecord>, VectorDbError> {
        let search = SearchPointsBuilder::new(CACHE_COLLECTION_NAME, query, limit)
            .with_payload(true)
            .filter(Self::tenant_filter(tenant_id));

        let response =
            self.client
                .search_points(search)
                .await
                .map_err(|e| VectorDbError::SearchFailed {
                    collection: CACHE_COLLECTION_NAME.to_string(),
                    message: e.to_string(),
                })?;

        let results = response
            .result
            .iter()
            .filter_map(|point| {
                CacheRecord::from_scored_point(point).map(|record| ScoredCacheRecord {
                    score: clamp_score(point.score),
                    record,
                })
            })
            .collect();

        Ok(results)
    }

    async fn health_check(&self) -> Result<(), VectorDbError> {
        self.client
            .health_check()
            .await
            .map_err(|e| VectorDbError::ConnectionFailed {
                url: self.url.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
