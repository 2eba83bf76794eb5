//! Request and response DTOs for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::gateway::GatewayHealth;
use crate::persistence::ConversationTurn;
use crate::vectordb::Citation;

/// `POST /chat` and `POST /chat/stream` request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    /// The student's question.
    pub message: String,
    /// Tenant scope; honored only in anonymous demo mode.
    pub tenant_id: Option<String>,
    /// Conversation to continue; a fresh one is created when absent.
    pub conversation_id: Option<String>,
}

/// `POST /chat` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponseBody {
    /// Answer or refusal text.
    pub response: String,
    /// Citations backing the answer.
    pub sources: Vec<Citation>,
    /// Marked for human review.
    pub should_escalate: bool,
    /// Evaluator confidence in `[0, 1]`.
    pub confidence: f32,
    /// Conversation the turn was recorded under.
    pub conversation_id: String,
}

/// `POST /upload/content` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponseBody {
    /// Final upload status (`ready` on success).
    pub status: String,
    /// Original filename.
    pub filename: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Chunks written to the index.
    pub chunks_created: u32,
    /// Upload record id.
    pub upload_id: String,
}

/// `GET /conversations/{tenant_id}` response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationsBody {
    /// Turns, newest first.
    pub conversations: Vec<ConversationTurn>,
}

/// `GET /conversations/{tenant_id}` query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ConversationsQuery {
    /// Page size; defaults to 50, capped at 200.
    pub limit: Option<usize>,
}

/// `GET /health` response body.
#[derive(Debug, Serialize)]
pub struct HealthBody {
    /// `ok` when every dependency is reachable, `degraded` otherwise.
    pub status: &'static str,
    /// Per-dependency detail.
    pub dependencies: HealthDependencies,
}

/// Dependency section of the health body.
#[derive(Debug, Serialize)]
pub struct HealthDependencies {
    /// Breaker states per model dependency.
    pub model_gateway: GatewayHealth,
    /// Vector index reachability.
    pub vector: &'static str,
    /// Persistence collaborator reachability.
    pub persistence: &'static str,
}

/// One server-sent event on `/chat/stream`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEventBody {
    /// A response token.
    Token {
        /// Token text.
        content: String,
    },
    /// Terminal success event, exactly one per stream.
    Done {
        /// Citations backing the answer.
        sources: Vec<Citation>,
        /// Marked for human review.
        should_escalate: bool,
        /// Evaluator confidence.
        confidence: f32,
        /// Conversation the turn was recorded under.
        conversation_id: String,
    },
    /// Terminal failure event.
    Error {
        /// Failure kind, from the service taxonomy.
        kind: String,
        /// User-safe message.
        message: String,
    },
}
