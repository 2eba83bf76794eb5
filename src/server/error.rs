//! HTTP error envelope.
//!
//! Every failure leaves the service as `{"error": {kind, message,
//! retry_after?}}`. Messages are user-safe by construction: provider names,
//! stack traces, and guard pattern details stay in the logs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::agent::{AgentError, AgentErrorKind};
use crate::gateway::GatewayError;
use crate::ingest::{IngestError, ProcessError};
use crate::limiter::RateLimited;

#[derive(Debug, Error)]
/// Errors surfaced by the HTTP layer, aligned with the service taxonomy.
pub enum ApiError {
    /// Malformed or oversized input; rejected before any upstream call.
    #[error("{message}")]
    InputInvalid {
        /// What was wrong.
        message: String,
    },

    /// No verified identity and anonymous access is disabled.
    #[error("authentication required")]
    Unauthenticated,

    /// Verified identity does not match the requested tenant.
    #[error("access to this tenant is not permitted")]
    ForbiddenTenant,

    /// A rate-limit bucket denied the request.
    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimited {
        /// Whole seconds until a token frees up.
        retry_after: u64,
    },

    /// The prompt guard refused the input. The message is the generic
    /// refusal, never the matched pattern.
    #[error("{message}")]
    GuardRejected {
        /// Safe refusal text.
        message: String,
    },

    /// Document text could not be extracted.
    #[error("could not extract text from the uploaded file")]
    ExtractionFailed,

    /// The upload contained no usable text.
    #[error("the uploaded file contained no usable text")]
    NoCorpus,

    /// Upstream model providers failed after retries and fallback.
    #[error("upstream service unavailable")]
    UpstreamUnavailable,

    /// A required dependency is down with no fallback (breaker open).
    #[error("service temporarily degraded")]
    Degraded,

    /// A pipeline stage exceeded its deadline.
    #[error("the request timed out")]
    StageTimeout,

    /// Anything else.
    #[error("internal error")]
    Internal,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::InputInvalid { .. } => "input_invalid",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::ForbiddenTenant => "forbidden_tenant",
            ApiError::RateLimited { .. } => "rate_limited",
            ApiError::GuardRejected { .. } => "guard_rejected",
            ApiError::ExtractionFailed => "extraction_failed",
            ApiError::NoCorpus => "no_corpus",
            ApiError::UpstreamUnavailable => "upstream_unavailable",
            ApiError::Degraded => "degraded",
            ApiError::StageTimeout => "stage_timeout",
            ApiError::Internal => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InputInvalid { .. }
            | ApiError::ExtractionFailed
            | ApiError::NoCorpus => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::ForbiddenTenant => StatusCode::FORBIDDEN,
            ApiError::GuardRejected { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            ApiError::Degraded => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StageTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    kind: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };

        let body = Json(ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
                retry_after,
            },
        });

        (self.status(), body).into_response()
    }
}

impl From<RateLimited> for ApiError {
    fn from(denial: RateLimited) -> Self {
        ApiError::RateLimited {
            retry_after: denial.retry_after_secs(),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        match err.kind {
            AgentErrorKind::StageTimeout => ApiError::StageTimeout,
            AgentErrorKind::RetrievalUnavailable => ApiError::Degraded,
            AgentErrorKind::Internal => ApiError::Internal,
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::UpstreamUnavailable { .. } => ApiError::UpstreamUnavailable,
            GatewayError::PolicyRejection { .. } => ApiError::GuardRejected {
                message: "this request cannot be processed".to_string(),
            },
            GatewayError::InvalidRequest { .. } => ApiError::Internal,
            GatewayError::Cancelled => ApiError::Internal,
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Process(ProcessError::UnsupportedType { declared }) => {
                ApiError::InputInvalid {
                    message: format!("unsupported content type: {declared}"),
                }
            }
            IngestError::Process(ProcessError::EmptyCorpus { .. }) => ApiError::NoCorpus,
            IngestError::Process(ProcessError::ExtractionFailed { .. }) => {
                ApiError::ExtractionFailed
            }
            IngestError::Process(ProcessError::Transcription(e)) => e.into(),
            IngestError::Embedding(_) => ApiError::UpstreamUnavailable,
            IngestError::DependencyUnavailable => ApiError::Degraded,
            IngestError::Index(_) => ApiError::Internal,
        }
    }
}
