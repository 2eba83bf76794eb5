//! Typed agent state and terminal outcome types.

use serde::Serialize;

use crate::evaluate::HallucinationFlag;
use crate::guard::GuardVerdict;
use crate::vectordb::{Citation, ScoredChunk};

/// Where a run currently is in the staged graph.
///
/// `initial → guarded → retrieved → (streaming | generated) → evaluated →
/// finalized`, with any stage able to jump to `errored`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing has run.
    Initial,
    /// Guard verdict recorded.
    Guarded,
    /// Context selected.
    Retrieved,
    /// Tokens flowing to the consumer.
    Streaming,
    /// Draft fully assembled.
    Generated,
    /// Confidence and flags computed.
    Evaluated,
    /// Terminal event emitted.
    Finalized,
    /// Terminal error emitted.
    Errored,
}

/// One query heading into the agent.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Scoping tenant.
    pub tenant_id: String,
    /// The student's question.
    pub query: String,
    /// Query embedding, when the endpoint already computed one for the
    /// cache probe. `None` makes the retrieve stage embed it.
    pub query_embedding: Option<Vec<f32>>,
}

/// Mutable state threaded through the stages.
#[derive(Debug)]
pub struct AgentState {
    /// Current phase, for logs and assertions.
    pub phase: Phase,
    /// Guard verdict, set by the guard stage.
    pub guard: Option<GuardVerdict>,
    /// Embedded query, set by the retrieve stage.
    pub query_embedding: Option<Vec<f32>>,
    /// Chunks kept for the prompt.
    pub context: Vec<ScoredChunk>,
    /// Citations derived from the kept chunks.
    pub sources: Vec<Citation>,
    /// Assembled draft.
    pub draft: String,
}

impl AgentState {
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Initial,
            guard: None,
            query_embedding: None,
            context: Vec::new(),
            sources: Vec::new(),
            draft: String::new(),
        }
    }
}

/// Terminal result of one agent run.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// Response text shown to the student.
    pub response: String,
    /// Citations backing the response.
    pub sources: Vec<Citation>,
    /// Evaluator confidence in `[0, 1]`.
    pub confidence: f32,
    /// Ungrounded claims found in the draft.
    pub hallucination_flags: Vec<HallucinationFlag>,
    /// Route to a human.
    pub should_escalate: bool,
    /// The guard refused this input outright (maps to HTTP 422).
    #[serde(skip)]
    pub guard_rejected: bool,
    /// Generation was unavailable; the response is a degraded-service
    /// notice.
    #[serde(skip)]
    pub degraded: bool,
}

/// One event on the agent's output stream: zero or more tokens, then
/// exactly one terminal `Done` or `Error`.
#[derive(Debug)]
pub enum AgentEvent {
    /// A response token, in arrival order.
    Token(String),
    /// Terminal success (including refusals).
    Done(Box<TurnOutcome>),
    /// Terminal failure; the message is user-safe.
    Error {
        /// Failure class.
        kind: super::error::AgentErrorKind,
        /// User-safe description.
        message: String,
    },
}
