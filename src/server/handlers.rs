//! Request handlers for the query and ingestion surface.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::Json;
use axum::extract::{ConnectInfo, Multipart, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::stream::Stream;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::error::ApiError;
use super::payload::*;
use super::state::AppState;
use crate::agent::{AgentEvent, AgentRequest, TurnOutcome};
use crate::cache::CacheHit;
use crate::constants::{DEFAULT_CONVERSATION_LIMIT, MAX_CONVERSATION_LIMIT};
use crate::gateway::ModelProvider;
use crate::persistence::ConversationTurn;
use crate::vectordb::VectorIndex;

/// Header set by the (external) auth layer once a session is verified.
pub const VERIFIED_TENANT_HEADER: &str = "x-verified-tenant";

const FALLBACK_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// `GET /health`.
#[instrument(skip_all)]
pub async fn health_handler<P, V>(State(state): State<AppState<P, V>>) -> Response
where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    let model_gateway = state.gateway.health();
    let vector = match state.index.health_check().await {
        Ok(()) => "ok",
        Err(_) => "unavailable",
    };
    let persistence = match state.persistence.health_check().await {
        Ok(()) => "ok",
        Err(_) => "unavailable",
    };

    let status = if vector == "ok" && persistence == "ok" && model_gateway.chat_available() {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthBody {
        status,
        dependencies: HealthDependencies {
            model_gateway,
            vector,
            persistence,
        },
    })
    .into_response()
}

/// `POST /upload/content` (multipart).
#[instrument(skip_all)]
pub async fn upload_handler<P, V>(
    State(state): State<AppState<P, V>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadResponseBody>, ApiError>
where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;
    let mut tenant_field: Option<String> = None;
    let mut content_type: Option<String> = None;
    let mut title: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::InputInvalid {
            message: format!("malformed multipart body: {e}"),
        }
    })? {
        match field.name() {
            Some("file") => {
                filename = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(|e| ApiError::InputInvalid {
                    message: format!("unreadable file part: {e}"),
                })?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("tenant_id") => {
                tenant_field = Some(text_field(field).await?);
            }
            Some("content_type") => {
                content_type = Some(text_field(field).await?);
            }
            Some("title") => {
                title = Some(text_field(field).await?);
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| ApiError::InputInvalid {
        message: "missing file part".to_string(),
    })?;
    if bytes.is_empty() {
        return Err(ApiError::InputInvalid {
            message: "uploaded file is empty".to_string(),
        });
    }
    let filename = filename.unwrap_or_else(|| "upload.bin".to_string());
    let content_type = content_type.ok_or_else(|| ApiError::InputInvalid {
        message: "missing content_type field".to_string(),
    })?;

    let tenant_id = resolve_tenant(
        &headers,
        tenant_field.as_deref(),
        state.config.server.allow_anonymous_tenant,
    )?;

    let record = state
        .ingestor
        .ingest(&tenant_id, &filename, &content_type, title, bytes)
        .await?;

    info!(tenant = %tenant_id, chunks = record.chunk_count, "upload indexed");

    Ok(Json(UploadResponseBody {
        status: "ready".to_string(),
        filename: record.filename,
        tenant_id,
        chunks_created: record.chunk_count,
        upload_id: record.id.to_string(),
    }))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(|e| ApiError::InputInvalid {
        message: format!("unreadable field: {e}"),
    })
}

/// `POST /chat`.
#[instrument(skip_all)]
pub async fn chat_handler<P, V>(
    State(state): State<AppState<P, V>>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Json<ChatResponseBody>, ApiError>
where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    let prepared = prepare_chat(&state, &headers, connect_info, &body).await?;

    if let Some(hit) = prepared.cached {
        debug!(score = hit.score, "serving cached response");
        return Ok(Json(ChatResponseBody {
            response: hit.response,
            sources: hit.sources,
            should_escalate: false,
            confidence: hit.confidence,
            conversation_id: prepared.conversation_id,
        }));
    }

    let memory = state.memories.bind(&prepared.conversation_id);
    let outcome = state
        .agent
        .run(
            AgentRequest {
                tenant_id: prepared.tenant_id.clone(),
                query: body.message.clone(),
                query_embedding: Some(prepared.embedding.clone()),
            },
            memory,
        )
        .await?;

    if outcome.guard_rejected {
        return Err(ApiError::GuardRejected {
            message: outcome.response,
        });
    }

    finalize_turn(&state, &prepared, &body.message, &outcome).await;

    Ok(Json(ChatResponseBody {
        response: outcome.response,
        sources: outcome.sources,
        should_escalate: outcome.should_escalate,
        confidence: outcome.confidence,
        conversation_id: prepared.conversation_id,
    }))
}

/// `POST /chat/stream` (server-sent events).
#[instrument(skip_all)]
pub async fn chat_stream_handler<P, V>(
    State(state): State<AppState<P, V>>,
    headers: HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<ChatRequestBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>> + Send + 'static>, ApiError>
where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    let prepared = prepare_chat(&state, &headers, connect_info, &body).await?;
    let conversation_id = prepared.conversation_id.clone();

    let (tx, rx) = mpsc::channel::<StreamEventBody>(32);

    if let Some(hit) = prepared.cached {
        // Cache hits replay as a single synthetic token plus the terminal
        // event, keeping stream and buffered responses identical.
        debug!(score = hit.score, "serving cached response as synthetic stream");
        tokio::spawn(async move {
            let _ = tx
                .send(StreamEventBody::Token {
                    content: hit.response.clone(),
                })
                .await;
            let _ = tx
                .send(StreamEventBody::Done {
                    sources: hit.sources,
                    should_escalate: false,
                    confidence: hit.confidence,
                    conversation_id,
                })
                .await;
        });
    } else {
        let memory = state.memories.bind(&prepared.conversation_id);
        let mut events = state.agent.execute(
            AgentRequest {
                tenant_id: prepared.tenant_id.clone(),
                query: body.message.clone(),
                query_embedding: Some(prepared.embedding.clone()),
            },
            memory,
        );

        let state = state.clone();
        let message = body.message.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    AgentEvent::Token(content) => {
                        if tx.send(StreamEventBody::Token { content }).await.is_err() {
                            // Client went away; dropping `events` cancels the
                            // agent run and abandons the turn.
                            return;
                        }
                    }
                    AgentEvent::Done(outcome) => {
                        if outcome.guard_rejected {
                            let _ = tx
                                .send(StreamEventBody::Error {
                                    kind: "guard_rejected".to_string(),
                                    message: outcome.response.clone(),
                                })
                                .await;
                            return;
                        }

                        finalize_turn(&state, &prepared, &message, &outcome).await;
                        let _ = tx
                            .send(StreamEventBody::Done {
                                sources: outcome.sources.clone(),
                                should_escalate: outcome.should_escalate,
                                confidence: outcome.confidence,
                                conversation_id: conversation_id.clone(),
                            })
                            .await;
                        return;
                    }
                    AgentEvent::Error { kind, message } => {
                        let _ = tx
                            .send(StreamEventBody::Error {
                                kind: kind.as_str().to_string(),
                                message,
                            })
                            .await;
                        return;
                    }
                }
            }
        });
    }

    let sse_stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"type":"error","kind":"internal","message":"serialization"}"#.to_string());
        Ok(Event::default().data(data))
    });

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

/// `GET /conversations/{tenant_id}`.
#[instrument(skip_all, fields(tenant = %tenant_id))]
pub async fn conversations_handler<P, V>(
    State(state): State<AppState<P, V>>,
    headers: HeaderMap,
    Path(tenant_id): Path<String>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<ConversationsBody>, ApiError>
where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    // Listing another tenant's conversations is a cross-tenant attempt.
    let resolved = resolve_tenant(
        &headers,
        Some(&tenant_id),
        state.config.server.allow_anonymous_tenant,
    )?;
    if resolved != tenant_id {
        return Err(ApiError::ForbiddenTenant);
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_CONVERSATION_LIMIT)
        .min(MAX_CONVERSATION_LIMIT);

    let conversations = state
        .persistence
        .list_turns(&tenant_id, limit)
        .await
        .map_err(|e| {
            warn!("conversation listing failed: {e}");
            ApiError::Internal
        })?;

    Ok(Json(ConversationsBody { conversations }))
}

/// Pre-agent work shared by `/chat` and `/chat/stream`: validation, tenant
/// resolution, rate limiting, query embedding, cache probe.
struct PreparedChat {
    tenant_id: String,
    conversation_id: String,
    embedding: Vec<f32>,
    cached: Option<CacheHit>,
}

async fn prepare_chat<P, V>(
    state: &AppState<P, V>,
    headers: &HeaderMap,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    body: &ChatRequestBody,
) -> Result<PreparedChat, ApiError>
where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    let message = body.message.trim();
    if message.is_empty() {
        return Err(ApiError::InputInvalid {
            message: "message must not be empty".to_string(),
        });
    }
    if body.message.chars().count() > state.config.server.max_message_chars {
        return Err(ApiError::InputInvalid {
            message: format!(
                "message exceeds the {} character limit",
                state.config.server.max_message_chars
            ),
        });
    }

    let tenant_id = resolve_tenant(
        headers,
        body.tenant_id.as_deref(),
        state.config.server.allow_anonymous_tenant,
    )?;

    let source_ip = client_ip(headers, connect_info);
    state.limiter.check(&tenant_id, source_ip)?;

    let conversation_id = body
        .conversation_id
        .clone()
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // One embedding serves the cache probe and, on a miss, retrieval.
    let embedding = state
        .gateway
        .embed_one(&body.message)
        .await
        .map_err(|e| {
            warn!("query embedding failed: {e}");
            ApiError::Degraded
        })?;

    let cached = state
        .cache
        .lookup(&tenant_id, &body.message, &embedding)
        .await
        .unwrap_or_else(|e| {
            // A cache outage must not fail the query path.
            warn!("cache probe failed (continuing): {e}");
            None
        });

    Ok(PreparedChat {
        tenant_id,
        conversation_id,
        embedding,
        cached,
    })
}

/// Best-effort persistence and conditional cache store after a completed
/// turn. Neither failure reaches the user.
async fn finalize_turn<P, V>(
    state: &AppState<P, V>,
    prepared: &PreparedChat,
    message: &str,
    outcome: &TurnOutcome,
) where
    P: ModelProvider + 'static,
    V: VectorIndex + 'static,
{
    let turn = ConversationTurn {
        id: Uuid::new_v4(),
        tenant_id: prepared.tenant_id.clone(),
        conversation_id: prepared.conversation_id.clone(),
        user_message: message.to_string(),
        assistant_response: outcome.response.clone(),
        sources: outcome.sources.clone(),
        confidence: outcome.confidence,
        should_escalate: outcome.should_escalate,
        reviewed: false,
        created_at: chrono::Utc::now(),
    };

    if let Err(e) = state.persistence.insert_turn(turn).await {
        warn!("turn persistence failed (continuing): {e}");
    }

    if !outcome.degraded {
        if let Err(e) = state
            .cache
            .store(
                &prepared.tenant_id,
                message,
                prepared.embedding.clone(),
                &outcome.response,
                &outcome.sources,
                outcome.confidence,
                outcome.should_escalate,
            )
            .await
        {
            warn!("cache store failed (continuing): {e}");
        }
    }
}

fn resolve_tenant(
    headers: &HeaderMap,
    requested: Option<&str>,
    allow_anonymous: bool,
) -> Result<String, ApiError> {
    let verified = headers
        .get(VERIFIED_TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (verified, requested) {
        (Some(verified), Some(requested)) if verified != requested => {
            Err(ApiError::ForbiddenTenant)
        }
        (Some(verified), _) => Ok(verified.to_string()),
        (None, Some(requested)) if allow_anonymous && !requested.is_empty() => {
            Ok(requested.to_string())
        }
        _ => Err(ApiError::Unauthenticated),
    }
}

fn client_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or(connect_info.map(|ConnectInfo(addr)| addr.ip()))
        .unwrap_or(FALLBACK_IP)
}
