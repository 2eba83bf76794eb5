use thiserror::Error;

/// How a provider call failed, before gateway policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, 429, or 5xx; retryable and eligible for fallback.
    Transient,
    /// Provider refused on policy grounds; never retried, never falls back.
    Policy,
    /// Malformed or unauthorized request (4xx other than 429); not retried.
    Invalid,
}

/// A single failed provider call.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// Provider-reported detail. Internal only; never surfaced to users.
    pub message: String,
}

impl ProviderFailure {
    /// Transient failure with the given detail.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    /// Policy rejection with the given detail.
    pub fn policy(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Policy,
            message: message.into(),
        }
    }

    /// Non-retryable request error with the given detail.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Invalid,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
/// Errors surfaced by gateway operations after breaker, retry, and fallback
/// policy have run.
pub enum GatewayError {
    /// Breaker open or every fallback stage failed.
    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable {
        /// Aggregated detail, internal only.
        message: String,
    },

    /// The provider refused the request on policy grounds.
    #[error("provider policy rejection: {message}")]
    PolicyRejection {
        /// Provider-reported detail.
        message: String,
    },

    /// The request itself was rejected as malformed or unauthorized.
    #[error("invalid upstream request: {message}")]
    InvalidRequest {
        /// Provider-reported detail.
        message: String,
    },

    /// The consumer detached before the call completed.
    #[error("call cancelled by consumer")]
    Cancelled,
}

impl GatewayError {
    pub(crate) fn from_failure(failure: ProviderFailure) -> Self {
        match failure.kind {
            FailureKind::Transient => GatewayError::UpstreamUnavailable {
                message: failure.message,
            },
            FailureKind::Policy => GatewayError::PolicyRejection {
                message: failure.message,
            },
            FailureKind::Invalid => GatewayError::InvalidRequest {
                message: failure.message,
            },
        }
    }
}
