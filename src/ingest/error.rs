use thiserror::Error;

use crate::gateway::GatewayError;
use crate::vectordb::VectorDbError;

#[derive(Debug, Error)]
/// Errors from extraction and chunking.
pub enum ProcessError {
    /// The declared content type is not handled.
    #[error("unsupported content type: {declared}")]
    UnsupportedType {
        /// Declared type string.
        declared: String,
    },

    /// Text could not be pulled out of the payload.
    #[error("extraction failed: {message}")]
    ExtractionFailed {
        /// Detail.
        message: String,
    },

    /// No non-trivial text was extracted.
    #[error("no usable text extracted from '{filename}'")]
    EmptyCorpus {
        /// Source filename.
        filename: String,
    },

    /// Transcription call failed.
    #[error("transcription failed")]
    Transcription(#[from] GatewayError),
}

#[derive(Debug, Error)]
/// Errors from the ingestion coordinator.
pub enum IngestError {
    /// Processing failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Chunk embedding failed after retries.
    #[error("embedding failed: {0}")]
    Embedding(GatewayError),

    /// Vector index write failed.
    #[error("index write failed: {0}")]
    Index(#[from] VectorDbError),

    /// The gateway's embedding breaker is open and queueing is disabled.
    #[error("embedding dependency unavailable")]
    DependencyUnavailable,
}
