//! Storage models for corpus chunks and semantic cache records.

use qdrant_client::qdrant::ScoredPoint;
use serde::{Deserialize, Serialize};

/// Kind of source material a chunk was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// PDF document, extracted per page.
    Pdf,
    /// Plain UTF-8 text.
    Text,
    /// Audio recording, transcribed.
    Audio,
    /// Video recording, transcribed.
    Video,
}

impl ContentType {
    /// Stable wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Pdf => "pdf",
            ContentType::Text => "text",
            ContentType::Audio => "audio",
            ContentType::Video => "video",
        }
    }

    /// Parses a declared content type.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "pdf" => Some(ContentType::Pdf),
            "text" | "txt" => Some(ContentType::Text),
            "audio" => Some(ContentType::Audio),
            "video" => Some(ContentType::Video),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance attached to every stored chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning tenant. Every read path filters on this field.
    pub tenant_id: String,
    /// Source filename.
    pub source: String,
    /// Human-facing document title.
    pub title: String,
    /// Kind of source material.
    pub content_type: ContentType,
    /// Position of this chunk within the source.
    pub chunk_index: u32,
    /// Originating page for PDF sources.
    pub page_index: Option<u32>,
}

/// The atomic retrievable unit: an embedded text fragment with provenance.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// Chunk text.
    pub text: String,
    /// Embedding vector; uniform width within an index.
    pub embedding: Vec<f32>,
    /// Provenance.
    pub metadata: ChunkMetadata,
}

/// A retrieved chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// Cosine similarity, clamped to `[0, 1]`.
    pub score: f32,
    /// Chunk text.
    pub text: String,
    /// Provenance.
    pub metadata: ChunkMetadata,
}

/// Source citation carried on answers and persisted turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Document title.
    pub title: String,
    /// Retrieval score of the cited chunk.
    pub score: f32,
    /// Chunk position within the source.
    pub chunk_index: u32,
}

impl From<&ScoredChunk> for Citation {
    fn from(chunk: &ScoredChunk) -> Self {
        Self {
            title: chunk.metadata.title.clone(),
            score: chunk.score,
            chunk_index: chunk.metadata.chunk_index,
        }
    }
}

/// Stored semantic cache entry, one per `(tenant, query)` point.
#[derive(Debug, Clone)]
pub struct CacheRecord {
    /// Owning tenant.
    pub tenant_id: String,
    /// Original query text.
    pub query_text: String,
    /// Cached response text.
    pub response: String,
    /// Citations serialized as JSON.
    pub sources_json: String,
    /// Confidence of the cached response.
    pub confidence: f32,
    /// Tenant corpus generation at store time.
    pub generation: u64,
    /// Store time, epoch seconds.
    pub created_at: i64,
}

/// A cache record with its similarity to the probe query.
#[derive(Debug, Clone)]
pub struct ScoredCacheRecord {
    /// Cosine similarity, clamped to `[0, 1]`.
    pub score: f32,
    /// The stored entry.
    pub record: CacheRecord,
}

/// Clamps a cosine score into `[0, 1]`.
pub fn clamp_score(score: f32) -> f32 {
    score.clamp(0.0, 1.0)
}

/// Deterministic ordering for retrieved chunks: descending score, ties by
/// ascending `chunk_index`, then `source` lexicographic.
pub fn sort_scored_chunks(chunks: &mut [ScoredChunk]) {
    chunks.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
            .then_with(|| a.metadata.source.cmp(&b.metadata.source))
    });
}

impl ScoredChunk {
    /// Rebuilds a chunk from a Qdrant scored point; `None` when the payload
    /// is missing required fields.
    pub fn from_scored_point(point: ScoredPoint) -> Option<Self> {
        let payload = point.payload;

        let tenant_id = payload.get("tenant_id")?.as_str()?.to_string();
        let source = payload.get("source")?.as_str()?.to_string();
        let title = payload.get("title")?.as_str()?.to_string();
        let content_type =
            ContentType::parse(payload.get("content_type")?.as_str()?)?;
        let chunk_index = payload.get("chunk_index")?.as_integer()? as u32;
        let text = payload.get("text")?.as_str()?.to_string();
        let page_index = payload
            .get("page_index")
            .and_then(|v| v.as_integer())
            .map(|i| i as u32);

        Some(Self {
            score: clamp_score(point.score),
            text,
            metadata: ChunkMetadata {
                tenant_id,
                source,
                title,
                content_type,
                chunk_index,
                page_index,
            },
        })
    }
}

impl CacheRecord {
    /// Rebuilds a cache record from a Qdrant scored point.
    pub fn from_scored_point(point: &ScoredPoint) -> Option<Self> {
        let payload = &point.payload;

        Some(Self {
            tenant_id: payload.get("tenant_id")?.as_str()?.to_string(),
            query_text: payload.get("query_text")?.as_str()?.to_string(),
            response: payload.get("response")?.as_str()?.to_string(),
            sources_json: payload.get("sources_json")?.as_str()?.to_string(),
            confidence: payload.get("confidence")?.as_double()? as f32,
            generation: payload.get("generation")?.as_integer()? as u64,
            created_at: payload.get("created_at")?.as_integer()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(score: f32, index: u32, source: &str) -> ScoredChunk {
        ScoredChunk {
            score,
            text: String::new(),
            metadata: ChunkMetadata {
                tenant_id: "t".into(),
                source: source.into(),
                title: "T".into(),
                content_type: ContentType::Text,
                chunk_index: index,
                page_index: None,
            },
        }
    }

    #[test]
    fn sort_is_score_desc_then_index_then_source() {
        let mut chunks = vec![
            chunk(0.5, 2, "b.txt"),
            chunk(0.9, 7, "a.txt"),
            chunk(0.5, 1, "z.txt"),
            chunk(0.5, 1, "a.txt"),
        ];
        sort_scored_chunks(&mut chunks);

        assert_eq!(chunks[0].score, 0.9);
        assert_eq!(
            (chunks[1].metadata.chunk_index, chunks[1].metadata.source.as_str()),
            (1, "a.txt")
        );
        assert_eq!(
            (chunks[2].metadata.chunk_index, chunks[2].metadata.source.as_str()),
            (1, "z.txt")
        );
        assert_eq!(chunks[3].metadata.chunk_index, 2);
    }

    #[test]
    fn content_type_round_trips_through_parse() {
        for ct in [
            ContentType::Pdf,
            ContentType::Text,
            ContentType::Audio,
            ContentType::Video,
        ] {
            assert_eq!(ContentType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(ContentType::parse("spreadsheet"), None);
    }

    #[test]
    fn scores_clamp_into_unit_interval() {
        assert_eq!(clamp_score(-0.2), 0.0);
        assert_eq!(clamp_score(0.5), 0.5);
        assert_eq!(clamp_score(1.7), 1.0);
    }
}
