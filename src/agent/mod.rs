//! Staged RAG agent: Guard → Retrieve → Generate → Evaluate → Finalize.
//!
//! The agent always produces a lazy token stream plus one terminal event;
//! the buffered entry point just drains it. That single path is what makes
//! streamed and buffered responses identical in content.

pub mod error;
pub mod prompts;
pub mod state;

#[cfg(test)]
mod tests;

pub use error::{AgentError, AgentErrorKind};
pub use state::{AgentEvent, AgentRequest, AgentState, Phase, TurnOutcome};

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{DeadlineConfig, RetrievalConfig};
use crate::evaluate::ResponseEvaluator;
use crate::gateway::{ChatTurn, GatewayError, ModelGateway, ModelProvider, StreamItem};
use crate::guard::{PromptGuard, ThreatLevel};
use crate::memory::{ConversationMemory, Role};
use crate::vectordb::{Citation, ScoredChunk, VectorIndex};

/// Staged agent over a gateway and a tenant-scoped index.
pub struct RagAgent<P: ModelProvider, V: VectorIndex> {
    gateway: Arc<ModelGateway<P>>,
    index: Arc<V>,
    guard: PromptGuard,
    evaluator: ResponseEvaluator,
    retrieval: RetrievalConfig,
    deadlines: DeadlineConfig,
    skip_generation_on_empty_context: bool,
}

impl<P: ModelProvider, V: VectorIndex> Clone for RagAgent<P, V> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            index: self.index.clone(),
            guard: self.guard,
            evaluator: self.evaluator,
            retrieval: self.retrieval,
            deadlines: self.deadlines,
            skip_generation_on_empty_context: self.skip_generation_on_empty_context,
        }
    }
}

impl<P, V> RagAgent<P, V>
where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    /// Wires the agent to its collaborators.
    pub fn new(
        gateway: Arc<ModelGateway<P>>,
        index: Arc<V>,
        evaluator: ResponseEvaluator,
        retrieval: RetrievalConfig,
        deadlines: DeadlineConfig,
        skip_generation_on_empty_context: bool,
    ) -> Self {
        Self {
            gateway,
            index,
            guard: PromptGuard::new(),
            evaluator,
            retrieval,
            deadlines,
            skip_generation_on_empty_context,
        }
    }

    /// Runs one turn and returns the stream of tokens plus a terminal
    /// event. Dropping the stream abandons the turn: upstream calls are
    /// cancelled and memory is left untouched.
    pub fn execute(
        &self,
        request: AgentRequest,
        memory: Arc<Mutex<ConversationMemory>>,
    ) -> ReceiverStream<AgentEvent> {
        let agent = self.clone();
        let (tx, rx) = mpsc::channel::<AgentEvent>(32);

        tokio::spawn(async move {
            agent.drive(request, memory, tx).await;
        });

        ReceiverStream::new(rx)
    }

    /// Buffered entry point: drains the stream and returns the outcome.
    pub async fn run(
        &self,
        request: AgentRequest,
        memory: Arc<Mutex<ConversationMemory>>,
    ) -> Result<TurnOutcome, AgentError> {
        let mut stream = self.execute(request, memory);

        while let Some(event) = stream.next().await {
            match event {
                AgentEvent::Token(_) => {}
                AgentEvent::Done(outcome) => return Ok(*outcome),
                AgentEvent::Error { kind, message } => return Err(AgentError { kind, message }),
            }
        }

        error!("agent stream ended without a terminal event");
        Err(AgentError::internal())
    }

    #[instrument(skip_all, fields(tenant = %request.tenant_id, query_len = request.query.len()))]
    async fn drive(
        &self,
        request: AgentRequest,
        memory: Arc<Mutex<ConversationMemory>>,
        tx: mpsc::Sender<AgentEvent>,
    ) {
        // Holding the lock across the turn serializes a conversation.
        let mut memory = memory.lock().await;
        let mut state = AgentState::new();

        // --- Guard ---
        let verdict = self.guard.check(&request.query);
        state.phase = Phase::Guarded;
        if verdict.threat_level == ThreatLevel::High {
            warn!(pattern = ?verdict.matched_pattern, "input blocked by prompt guard");
            state.phase = Phase::Finalized;
            let _ = tx
                .send(AgentEvent::Done(Box::new(TurnOutcome {
                    response: prompts::SAFE_REFUSAL.to_string(),
                    sources: Vec::new(),
                    confidence: 0.0,
                    hallucination_flags: Vec::new(),
                    should_escalate: true,
                    guard_rejected: true,
                    degraded: false,
                })))
                .await;
            return;
        }
        let hardened = verdict.threat_level == ThreatLevel::Medium;
        if hardened {
            debug!(pattern = ?verdict.matched_pattern, "continuing with hardened prompt");
        }
        state.guard = Some(verdict);

        // --- Retrieve ---
        match timeout(self.deadlines.retrieve, self.retrieve(&request)).await {
            Err(_) => {
                state.phase = Phase::Errored;
                let failure = AgentError::stage_timeout("retrieval");
                let _ = tx
                    .send(AgentEvent::Error {
                        kind: failure.kind,
                        message: failure.message,
                    })
                    .await;
                return;
            }
            Ok(Err(failure)) => {
                state.phase = Phase::Errored;
                let _ = tx
                    .send(AgentEvent::Error {
                        kind: failure.kind,
                        message: failure.message,
                    })
                    .await;
                return;
            }
            Ok(Ok((embedding, kept))) => {
                state.query_embedding = Some(embedding);
                state.sources = kept.iter().map(Citation::from).collect();
                state.context = kept;
                state.phase = Phase::Retrieved;
            }
        }
        debug!(kept = state.context.len(), "retrieval complete");

        // --- Generate ---
        let skip_model = state.context.is_empty() && self.skip_generation_on_empty_context;
        if skip_model {
            state.draft = prompts::NO_CONTEXT_ANSWER.to_string();
            state.phase = Phase::Generated;
            // The refusal still flows to streaming consumers as one token.
            if tx
                .send(AgentEvent::Token(state.draft.clone()))
                .await
                .is_err()
            {
                debug!("consumer detached, abandoning turn");
                return;
            }
        } else {
            let turns = self.build_turns(&request.query, &state, &memory, hardened);

            let stream = match self.gateway.chat_stream(&turns).await {
                Ok(stream) => stream,
                Err(GatewayError::UpstreamUnavailable { message }) => {
                    warn!("generation unavailable after fallback: {message}");
                    // Retrieval succeeded, so degrade instead of erroring.
                    self.finish_degraded(&tx, &state).await;
                    return;
                }
                Err(GatewayError::PolicyRejection { message }) => {
                    warn!("provider policy rejection: {message}");
                    state.phase = Phase::Finalized;
                    let _ = tx
                        .send(AgentEvent::Done(Box::new(TurnOutcome {
                            response: prompts::SAFE_REFUSAL.to_string(),
                            sources: Vec::new(),
                            confidence: 0.0,
                            hallucination_flags: Vec::new(),
                            should_escalate: true,
                            guard_rejected: false,
                            degraded: false,
                        })))
                        .await;
                    return;
                }
                Err(e) => {
                    error!("generation failed: {e}");
                    state.phase = Phase::Errored;
                    let failure = AgentError::internal();
                    let _ = tx
                        .send(AgentEvent::Error {
                            kind: failure.kind,
                            message: failure.message,
                        })
                        .await;
                    return;
                }
            };

            state.phase = Phase::Streaming;
            match self.pump_generation(stream, &tx).await {
                PumpOutcome::Completed(text) => {
                    state.draft = text;
                    state.phase = Phase::Generated;
                }
                PumpOutcome::Abandoned => {
                    debug!("consumer detached mid-stream, abandoning turn");
                    return;
                }
                PumpOutcome::TimedOut => {
                    state.phase = Phase::Errored;
                    let failure = AgentError::stage_timeout("generation");
                    let _ = tx
                        .send(AgentEvent::Error {
                            kind: failure.kind,
                            message: failure.message,
                        })
                        .await;
                    return;
                }
                PumpOutcome::Failed => {
                    state.phase = Phase::Errored;
                    let failure = AgentError::internal();
                    let _ = tx
                        .send(AgentEvent::Error {
                            kind: failure.kind,
                            message: failure.message,
                        })
                        .await;
                    return;
                }
            }
        }

        // --- Evaluate ---
        let evaluate_started = Instant::now();
        let evaluation = self.evaluator.evaluate(&state.draft, &state.context);
        if evaluate_started.elapsed() > self.deadlines.evaluate {
            state.phase = Phase::Errored;
            let failure = AgentError::stage_timeout("evaluation");
            let _ = tx
                .send(AgentEvent::Error {
                    kind: failure.kind,
                    message: failure.message,
                })
                .await;
            return;
        }
        state.phase = Phase::Evaluated;
        info!(
            confidence = evaluation.confidence,
            flags = evaluation.hallucination_flags.len(),
            escalate = evaluation.needs_review,
            "evaluation complete"
        );

        // --- Finalize ---
        self.record_turn(&mut memory, &request.query, &state.draft).await;
        state.phase = Phase::Finalized;

        let _ = tx
            .send(AgentEvent::Done(Box::new(TurnOutcome {
                response: state.draft,
                sources: state.sources,
                confidence: evaluation.confidence,
                hallucination_flags: evaluation.hallucination_flags,
                should_escalate: evaluation.needs_review,
                guard_rejected: false,
                degraded: false,
            })))
            .await;
    }

    /// Embeds the query (unless pre-embedded) and selects the context.
    async fn retrieve(
        &self,
        request: &AgentRequest,
    ) -> Result<(Vec<f32>, Vec<ScoredChunk>), AgentError> {
        let embedding = match &request.query_embedding {
            Some(embedding) => embedding.clone(),
            None => self.gateway.embed_one(&request.query).await.map_err(|e| {
                error!("query embedding failed: {e}");
                AgentError::retrieval_unavailable()
            })?,
        };

        let results = self
            .index
            .search_chunks(
                &request.tenant_id,
                embedding.clone(),
                self.retrieval.k_retrieve as u64,
            )
            .await
            .map_err(|e| {
                error!("vector search failed: {e}");
                AgentError::retrieval_unavailable()
            })?;

        Ok((embedding, self.select_context(results)))
    }

    /// Applies the no-context and keep thresholds, then the context cut.
    fn select_context(&self, results: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
        let top_score = results.first().map(|c| c.score).unwrap_or(0.0);
        if results.is_empty() || top_score < self.retrieval.score_no_context {
            return Vec::new();
        }

        results
            .into_iter()
            .filter(|c| c.score >= self.retrieval.score_keep)
            .take(self.retrieval.k_context)
            .collect()
    }

    fn build_turns(
        &self,
        query: &str,
        state: &AgentState,
        memory: &ConversationMemory,
        hardened: bool,
    ) -> Vec<ChatTurn> {
        let mut turns = vec![ChatTurn::system(prompts::system_prompt(hardened))];

        for message in memory.context() {
            turns.push(match message.role {
                Role::Summary => ChatTurn::system(format!(
                    "Summary of the earlier conversation: {}",
                    message.content
                )),
                Role::System => ChatTurn::system(message.content),
                Role::User => ChatTurn::user(message.content),
                Role::Assistant => ChatTurn::assistant(message.content),
            });
        }

        turns.push(ChatTurn::user(prompts::user_turn(query, &state.context)));
        turns
    }

    /// Forwards tokens until the gateway's terminal event, bounded by the
    /// generation deadline.
    async fn pump_generation(
        &self,
        mut stream: crate::gateway::GatewayStream,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> PumpOutcome {
        let deadline = tokio::time::Instant::now() + self.deadlines.generate;

        loop {
            let next = match tokio::time::timeout_at(deadline, stream.next()).await {
                Err(_) => return PumpOutcome::TimedOut,
                Ok(next) => next,
            };

            match next {
                Some(StreamItem::Token(token)) => {
                    if tx.send(AgentEvent::Token(token)).await.is_err() {
                        return PumpOutcome::Abandoned;
                    }
                }
                Some(StreamItem::Done { text, usage }) => {
                    debug!(completion_tokens = usage.completion_tokens, "generation complete");
                    return PumpOutcome::Completed(text);
                }
                Some(StreamItem::Error(e)) => {
                    error!("generation stream failed: {e}");
                    return PumpOutcome::Failed;
                }
                None => {
                    error!("generation stream ended without terminal event");
                    return PumpOutcome::Failed;
                }
            }
        }
    }

    /// Degraded finalization: retrieval worked, generation is down.
    async fn finish_degraded(&self, tx: &mpsc::Sender<AgentEvent>, state: &AgentState) {
        let notice = prompts::SERVICE_UNAVAILABLE_ANSWER.to_string();
        if tx.send(AgentEvent::Token(notice.clone())).await.is_err() {
            return;
        }
        let _ = tx
            .send(AgentEvent::Done(Box::new(TurnOutcome {
                response: notice,
                sources: state.sources.clone(),
                confidence: 0.0,
                hallucination_flags: Vec::new(),
                should_escalate: true,
                guard_rejected: false,
                degraded: true,
            })))
            .await;
    }

    /// Appends the completed exchange to conversation memory, summarizing
    /// overflow through the gateway.
    async fn record_turn(&self, memory: &mut ConversationMemory, query: &str, draft: &str) {
        let summarizer = |gateway: Arc<ModelGateway<P>>| {
            move |transcript: String| {
                let gateway = gateway.clone();
                async move {
                    let turns = vec![
                        ChatTurn::system(prompts::SUMMARIZE_SYSTEM),
                        ChatTurn::user(transcript),
                    ];
                    gateway.chat(&turns).await.map(|output| output.content)
                }
            }
        };

        memory
            .append(Role::User, query, summarizer(self.gateway.clone()))
            .await;
        memory
            .append(Role::Assistant, draft, summarizer(self.gateway.clone()))
            .await;
    }
}

enum PumpOutcome {
    Completed(String),
    Abandoned,
    TimedOut,
    Failed,
}
