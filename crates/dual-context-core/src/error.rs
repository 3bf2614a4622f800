//! Error taxonomy for the analysis engine.
//!
//! Per-commit failures are folded into an [`OutcomeError`] and never abort
//! the run. Only selection and configuration failures reach the caller.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::reasoning::ReasoningError;
use crate::retry::{RetryError, Retryable};
use crate::verdict::ParseError;

/// Errors produced while selecting, extracting or analysing commits.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("commit selection failed: {0}")]
    Selection(String),

    #[error("diff extraction failed for {commit}: {message}")]
    Extraction { commit: String, message: String },

    #[error("reasoning call failed: {0}")]
    Transport(#[from] ReasoningError),

    #[error("gave up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<AnalysisError>,
    },

    #[error("unparseable reasoning response: {0}")]
    Parse(#[from] ParseError),

    #[error("analysis cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Wrap a git or I/O failure that happened while diffing `commit`.
    pub fn extraction(commit: &str, err: impl std::fmt::Display) -> Self {
        Self::Extraction {
            commit: commit.to_string(),
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> OutcomeErrorKind {
        match self {
            Self::Selection(_) | Self::Extraction { .. } | Self::Config(_) => {
                OutcomeErrorKind::Extraction
            }
            Self::Transport(ReasoningError::Cancelled) => OutcomeErrorKind::Cancelled,
            Self::Transport(_) => OutcomeErrorKind::Transport,
            Self::RetryExhausted { .. } => OutcomeErrorKind::RetryExhausted,
            Self::Parse(_) => OutcomeErrorKind::Parse,
            Self::Cancelled => OutcomeErrorKind::Cancelled,
        }
    }

    /// Flatten into the serialisable form carried by an outcome.
    pub fn to_outcome_error(&self) -> OutcomeError {
        OutcomeError {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl Retryable for AnalysisError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }

    fn is_cancellation(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Transport(ReasoningError::Cancelled)
        )
    }

    fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            Self::Transport(e) => e.retry_after(),
            _ => None,
        }
    }
}

impl From<RetryError<AnalysisError>> for AnalysisError {
    fn from(err: RetryError<AnalysisError>) -> Self {
        match err {
            RetryError::Cancelled => Self::Cancelled,
            RetryError::Exhausted { attempts, last } => Self::RetryExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Permanent(e) => e,
        }
    }
}

/// Coarse classification of a per-commit failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeErrorKind {
    Extraction,
    Transport,
    RetryExhausted,
    Parse,
    Cancelled,
}

/// Failure recorded in an [`crate::AnalysisOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: OutcomeErrorKind,
    pub message: String,
}

impl std::fmt::Display for OutcomeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
