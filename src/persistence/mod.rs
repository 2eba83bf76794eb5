//! Persistence contract consumed by the core.
//!
//! Conversations and upload records are durably owned by an external
//! collaborator; the core only needs this narrow CRUD surface. Persistence
//! failures are logged by callers and never propagate to the user-visible
//! path.

pub mod memory;

pub use memory::InMemoryPersistence;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::vectordb::{Citation, ContentType};

/// Lifecycle of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Accepted, not yet picked up.
    Pending,
    /// Extraction/embedding in flight.
    Processing,
    /// Indexed and searchable.
    Ready,
    /// Gave up; `failure_reason` says why.
    Failed,
}

/// One accepted upload. Invariant: `chunk_count > 0` iff `status == Ready`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Record id.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Original filename.
    pub filename: String,
    /// Declared content type.
    pub declared_type: ContentType,
    /// Payload size in bytes.
    pub byte_size: u64,
    /// Current lifecycle state.
    pub status: UploadStatus,
    /// Chunks indexed; zero unless `Ready`.
    pub chunk_count: u32,
    /// Failure detail when `Failed`.
    pub failure_reason: Option<String>,
    /// Accept time.
    pub created_at: DateTime<Utc>,
}

impl UploadRecord {
    /// Fresh `Pending` record.
    pub fn pending(
        tenant_id: impl Into<String>,
        filename: impl Into<String>,
        declared_type: ContentType,
        byte_size: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            filename: filename.into(),
            declared_type,
            byte_size,
            status: UploadStatus::Pending,
            chunk_count: 0,
            failure_reason: None,
            created_at: Utc::now(),
        }
    }
}

/// One completed question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Turn id.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: String,
    /// Conversation this turn belongs to.
    pub conversation_id: String,
    /// The student's question.
    pub user_message: String,
    /// The generated answer (or refusal).
    pub assistant_response: String,
    /// Citations backing the answer.
    pub sources: Vec<Citation>,
    /// Evaluator confidence in `[0, 1]`.
    pub confidence: f32,
    /// Marked for human review.
    pub should_escalate: bool,
    /// A human has looked at this turn.
    pub reviewed: bool,
    /// Completion time.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
/// Persistence collaborator failure.
pub enum PersistenceError {
    /// The backing store could not be reached or rejected the write.
    #[error("persistence unavailable: {message}")]
    Unavailable {
        /// Detail.
        message: String,
    },
}

/// Narrow CRUD surface over the external persistence collaborator.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Records one completed turn.
    async fn insert_turn(&self, turn: ConversationTurn) -> Result<(), PersistenceError>;

    /// Lists a tenant's turns, newest first.
    async fn list_turns(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>, PersistenceError>;

    /// Records a new upload.
    async fn insert_upload(&self, record: UploadRecord) -> Result<(), PersistenceError>;

    /// Advances an upload's lifecycle state.
    async fn update_upload_status(
        &self,
        id: Uuid,
        status: UploadStatus,
        chunk_count: Option<u32>,
        reason: Option<String>,
    ) -> Result<(), PersistenceError>;

    /// Cheap availability probe for `/health`.
    async fn health_check(&self) -> Result<(), PersistenceError>;
}
