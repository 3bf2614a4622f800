//! Error types for dual-context-gemini

use thiserror::Error;

/// Errors raised while setting up a Gemini client.
///
/// Failures of individual calls are reported as
/// [`dual_context_core::ReasoningError`] instead.
#[derive(Error, Debug)]
pub enum GeminiError {
    /// No API key in config, flags or environment
    #[error("no Gemini API key configured (set GEMINI_API_KEY or llm.api_key)")]
    MissingApiKey,

    /// Unsupported `llm.provider` value
    #[error("unsupported reasoning provider: {0}")]
    UnsupportedProvider(String),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}
