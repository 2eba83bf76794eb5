use serde::Serialize;
use thiserror::Error;

/// Why an agent run ended in the errored state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentErrorKind {
    /// A stage exceeded its deadline.
    StageTimeout,
    /// Retrieval itself (embedding or search) was unavailable.
    RetrievalUnavailable,
    /// Anything else; detail stays in the logs.
    Internal,
}

impl AgentErrorKind {
    /// Stable wire name used in SSE error events.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentErrorKind::StageTimeout => "stage_timeout",
            AgentErrorKind::RetrievalUnavailable => "retrieval_unavailable",
            AgentErrorKind::Internal => "internal",
        }
    }
}

/// Terminal agent failure. The message is already user-safe; internal
/// detail is logged at the failure site, never carried here.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AgentError {
    /// Failure class.
    pub kind: AgentErrorKind,
    /// User-safe description.
    pub message: String,
}

impl AgentError {
    /// Stage deadline exceeded.
    pub fn stage_timeout(stage: &'static str) -> Self {
        Self {
            kind: AgentErrorKind::StageTimeout,
            message: format!("the {stage} stage timed out"),
        }
    }

    /// Retrieval dependency down.
    pub fn retrieval_unavailable() -> Self {
        Self {
            kind: AgentErrorKind::RetrievalUnavailable,
            message: "retrieval is temporarily unavailable".to_string(),
        }
    }

    /// Unspecified internal failure.
    pub fn internal() -> Self {
        Self {
            kind: AgentErrorKind::Internal,
            message: "an internal error interrupted this request".to_string(),
        }
    }
}
