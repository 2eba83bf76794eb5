//! Ingestion coordinator: bytes in, tenant-scoped searchable chunks out.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::chunker::RecursiveSplitter;
use super::error::{IngestError, ProcessError};
use super::extract::{self, Segment};
use crate::cache::SemanticCache;
use crate::gateway::{GatewayError, ModelGateway, ModelProvider};
use crate::persistence::{Persistence, UploadRecord, UploadStatus};
use crate::vectordb::{ChunkMetadata, ContentType, DocumentChunk, VectorIndex};

/// Chunk texts embedded per gateway call.
const EMBED_BATCH_SIZE: usize = 64;

/// Runs the ingest path: extract, chunk, embed, index, invalidate cache.
pub struct IngestionCoordinator<P: ModelProvider, V: VectorIndex> {
    gateway: Arc<ModelGateway<P>>,
    index: Arc<V>,
    cache: Arc<SemanticCache<V>>,
    persistence: Arc<dyn Persistence>,
    splitter: RecursiveSplitter,
    queue_on_breaker_open: bool,
    breaker_open_wait: Duration,
}

impl<P: ModelProvider, V: VectorIndex> IngestionCoordinator<P, V> {
    /// Wires the coordinator to its collaborators.
    pub fn new(
        gateway: Arc<ModelGateway<P>>,
        index: Arc<V>,
        cache: Arc<SemanticCache<V>>,
        persistence: Arc<dyn Persistence>,
        splitter: RecursiveSplitter,
        queue_on_breaker_open: bool,
        breaker_open_wait: Duration,
    ) -> Self {
        Self {
            gateway,
            index,
            cache,
            persistence,
            splitter,
            queue_on_breaker_open,
            breaker_open_wait,
        }
    }

    /// Ingests one uploaded file for a tenant.
    ///
    /// The upload record transitions `pending → processing → ready|failed`;
    /// `chunk_count` is only non-zero on `ready`. Embedding and indexing are
    /// idempotent on `(tenant, source, chunk_index)`, so a retried upload
    /// replaces rather than duplicates.
    #[instrument(skip(self, bytes, title), fields(tenant = tenant_id, filename, bytes = bytes.len()))]
    pub async fn ingest(
        &self,
        tenant_id: &str,
        filename: &str,
        declared_type: &str,
        title: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<UploadRecord, IngestError> {
        let content_type = extract::parse_declared_type(declared_type)?;
        let title = title.unwrap_or_else(|| filename.to_string());

        let mut record = UploadRecord::pending(
            tenant_id,
            filename,
            content_type,
            bytes.len() as u64,
        );
        self.persist_insert(&record).await;
        self.persist_status(record.id, UploadStatus::Processing, None, None)
            .await;
        record.status = UploadStatus::Processing;

        let chunks = match self
            .process(tenant_id, filename, &title, content_type, bytes)
            .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                self.persist_status(
                    record.id,
                    UploadStatus::Failed,
                    None,
                    Some(e.to_string()),
                )
                .await;
                record.status = UploadStatus::Failed;
                record.failure_reason = Some(e.to_string());
                return Err(e.into());
            }
        };

        let chunk_count = chunks.len() as u32;
        match self.embed_and_index(chunks).await {
            Ok(()) => {}
            Err(e) => {
                self.persist_status(
                    record.id,
                    UploadStatus::Failed,
                    None,
                    Some(e.to_string()),
                )
                .await;
                record.status = UploadStatus::Failed;
                record.failure_reason = Some(e.to_string());
                return Err(e);
            }
        }

        // The generation bump comes after the upsert: lookups during
        // ingestion keep serving pre-ingestion answers (monotonic
        // visibility), and flip over only once the new chunks are live.
        let generation = self.cache.bump_generation(tenant_id);

        self.persist_status(record.id, UploadStatus::Ready, Some(chunk_count), None)
            .await;
        record.status = UploadStatus::Ready;
        record.chunk_count = chunk_count;

        info!(
            chunks = chunk_count,
            generation, "ingestion complete, corpus generation bumped"
        );
        Ok(record)
    }

    /// Extraction + chunking. Audio/video are transcribed through the
    /// gateway first; the transcript is then chunked like plain text.
    async fn process(
        &self,
        tenant_id: &str,
        filename: &str,
        title: &str,
        content_type: ContentType,
        bytes: Vec<u8>,
    ) -> Result<Vec<DocumentChunk>, ProcessError> {
        let segments: Vec<Segment> = match content_type {
            ContentType::Pdf => extract::extract_pdf(&bytes, filename)?,
            ContentType::Text => extract::extract_text(bytes, filename)?,
            ContentType::Audio | ContentType::Video => {
                let transcript = self.gateway.transcribe(filename, bytes).await?;
                extract::transcript_segment(transcript, filename)?
            }
        };

        let mut chunks = Vec::new();
        let mut chunk_index = 0u32;
        for segment in segments {
            for text in self.splitter.split(&segment.text) {
                chunks.push(DocumentChunk {
                    text,
                    embedding: Vec::new(),
                    metadata: ChunkMetadata {
                        tenant_id: tenant_id.to_string(),
                        source: filename.to_string(),
                        title: title.to_string(),
                        content_type,
                        chunk_index,
                        page_index: segment.page_index,
                    },
                });
                chunk_index += 1;
            }
        }

        if chunks.is_empty() {
            return Err(ProcessError::EmptyCorpus {
                filename: filename.to_string(),
            });
        }

        Ok(chunks)
    }

    /// Embeds chunk texts in batches and writes them to the index. Only a
    /// failing batch is retried (the gateway retries transient failures
    /// internally; breaker-open waits are opt-in via configuration).
    async fn embed_and_index(&self, mut chunks: Vec<DocumentChunk>) -> Result<(), IngestError> {
        for batch in chunks.chunks_mut(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let vectors = match self.gateway.embed(&texts).await {
                Ok(vectors) => vectors,
                Err(GatewayError::UpstreamUnavailable { .. }) if self.queue_on_breaker_open => {
                    warn!(
                        wait_ms = self.breaker_open_wait.as_millis() as u64,
                        "embedding unavailable, waiting out the breaker"
                    );
                    tokio::time::sleep(self.breaker_open_wait).await;
                    self.gateway
                        .embed(&texts)
                        .await
                        .map_err(IngestError::Embedding)?
                }
                Err(GatewayError::UpstreamUnavailable { .. }) => {
                    return Err(IngestError::DependencyUnavailable);
                }
                Err(e) => return Err(IngestError::Embedding(e)),
            };

            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.embedding = vector;
            }
        }

        self.index.upsert_chunks(chunks).await?;
        Ok(())
    }

    async fn persist_insert(&self, record: &UploadRecord) {
        if let Err(e) = self.persistence.insert_upload(record.clone()).await {
            warn!("upload record insert failed (continuing): {e}");
        }
    }

    async fn persist_status(
        &self,
        id: uuid::Uuid,
        status: UploadStatus,
        chunk_count: Option<u32>,
        reason: Option<String>,
    ) {
        if let Err(e) = self
            .persistence
            .update_upload_status(id, status, chunk_count, reason)
            .await
        {
            warn!("upload status update failed (continuing): {e}");
        }
    }
}
