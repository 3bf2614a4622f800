//! Boundary to the external text-reasoning capability.
//!
//! The engine treats the backend as an opaque text-in/text-out call. Backends
//! implement [`ReasoningClient`]; the orchestrator holds one behind an `Arc`.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::retry::Retryable;

/// Substrings that mark a transport failure as transient.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection reset",
    "connection refused",
    "no such host",
    "timeout",
    "timed out",
    "temporary failure",
];

/// A single prompt ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningRequest {
    pub prompt: String,
}

impl ReasoningRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Failures reported by a reasoning backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasoningError {
    #[error("reasoning call timed out")]
    Timeout,

    #[error("rate limited by reasoning backend")]
    RateLimited { retry_after: Option<Duration> },

    #[error("backend server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("backend rejected request ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned an empty response")]
    EmptyResponse,

    #[error("reasoning call cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl ReasoningError {
    /// Map an HTTP status to an error, or `None` for success codes.
    pub fn from_status(status: u16, message: impl Into<String>) -> Option<Self> {
        match status {
            200..=299 => None,
            429 => Some(Self::RateLimited { retry_after: None }),
            500..=599 => Some(Self::Server {
                status,
                message: message.into(),
            }),
            _ => Some(Self::Client {
                status,
                message: message.into(),
            }),
        }
    }
}

fn has_transient_marker(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}

impl Retryable for ReasoningError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::RateLimited { .. } => true,
            Self::Server { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            Self::Network(message) | Self::Other(message) => has_transient_marker(message),
            Self::Client { .. } | Self::EmptyResponse | Self::Cancelled => false,
        }
    }

    fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Opaque text-reasoning backend.
#[async_trait]
pub trait ReasoningClient: Send + Sync {
    /// Send one request and return the raw response text.
    ///
    /// Implementations should stop work and return
    /// [`ReasoningError::Cancelled`] once `cancel` fires.
    async fn complete(
        &self,
        request: &ReasoningRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ReasoningError>;

    /// Model identifier reported in the run summary.
    fn model_name(&self) -> &str;
}
