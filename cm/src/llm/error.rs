//! Completion gateway errors

use std::time::Duration;
use thiserror::Error;

/// Why a completion call failed
///
/// The extraction chain never looks inside: any error abandons the unit the
/// call belonged to. The variants exist for the transport's retry decisions
/// and for the trace text.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited by provider (retry after {}s)", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Provider returned HTTP {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unusable completion: {0}")]
    InvalidResponse(String),

    #[error("Malformed provider payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gateway misconfigured: {0}")]
    Config(String),
}

impl LlmError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: String, retry_after: Option<Duration>) -> Self {
        match (status, retry_after) {
            (429, Some(retry_after)) => LlmError::RateLimited { retry_after },
            (429, None) => LlmError::RateLimited {
                retry_after: Duration::from_secs(DEFAULT_RATE_LIMIT_WAIT_SECS),
            },
            _ => LlmError::ApiError { status, message: body },
        }
    }

    /// Whether sending the same request again may succeed
    ///
    /// 529 is Anthropic's "overloaded".
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Network(_) => true,
            LlmError::ApiError { status, .. } => matches!(status, 408 | 500..=504 | 529),
            LlmError::InvalidResponse(_) | LlmError::Json(_) | LlmError::Config(_) => false,
        }
    }

    /// Provider-requested pause, if any
    pub fn retry_after(&self) -> Option<Duration> {
        if let LlmError::RateLimited { retry_after } = self {
            Some(*retry_after)
        } else {
            None
        }
    }
}

/// Pause assumed when a 429 carries no usable `retry-after` header
pub const DEFAULT_RATE_LIMIT_WAIT_SECS: u64 = 60;
