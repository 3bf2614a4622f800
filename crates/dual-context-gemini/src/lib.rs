//! Gemini backend for git-dual-context
//!
//! Implements [`ReasoningClient`] on top of the Generative Language
//! `generateContent` endpoint. Each call is a single non-streaming request;
//! retries and timeouts are owned by the orchestrator.

pub mod error;
pub mod wire;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use dual_context_core::config::DEFAULT_PROVIDER;
use dual_context_core::{AnalysisConfig, ReasoningClient, ReasoningError, ReasoningRequest};

pub use error::GeminiError;
use wire::{decode_response, error_message, GenerateRequest};

/// Public Generative Language API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable consulted when no key is configured.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini connection settings
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    /// Base URL without trailing slash
    pub endpoint: String,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.1,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build from the `[llm]` section, falling back to `GEMINI_API_KEY`.
    pub fn from_analysis_config(config: &AnalysisConfig) -> Result<Self, GeminiError> {
        if config.llm.provider != DEFAULT_PROVIDER {
            return Err(GeminiError::UnsupportedProvider(config.llm.provider.clone()));
        }
        let api_key = config
            .llm
            .api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(GeminiError::MissingApiKey)?;

        Ok(Self::new(api_key, config.llm.model.clone()).with_temperature(config.llm.temperature))
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

/// [`ReasoningClient`] for Gemini models
pub struct GeminiClient {
    config: GeminiConfig,
    http_client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GeminiError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("git-dual-context/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(GeminiClient {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn send(&self, prompt: &str) -> Result<String, ReasoningError> {
        let body = GenerateRequest::new(prompt, self.config.temperature);
        let response = self
            .http_client
            .post(self.config.url())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.map_err(map_transport_error)?;
        debug!(status = status, bytes = text.len(), "gemini response received");

        if let Some(err) = ReasoningError::from_status(status, error_message(&text)) {
            return Err(match err {
                ReasoningError::RateLimited { .. } => ReasoningError::RateLimited { retry_after },
                other => other,
            });
        }
        decode_response(&text)
    }
}

#[async_trait]
impl ReasoningClient for GeminiClient {
    async fn complete(
        &self,
        request: &ReasoningRequest,
        cancel: &CancellationToken,
    ) -> Result<String, ReasoningError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ReasoningError::Cancelled),
            result = self.send(&request.prompt) => result,
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Classify a reqwest failure.
///
/// The message includes the whole source chain, since the transient markers
/// (`connection refused` and friends) live in the innermost error.
pub fn map_transport_error(err: reqwest::Error) -> ReasoningError {
    if err.is_timeout() {
        return ReasoningError::Timeout;
    }
    let message = error_chain(&err);
    if err.is_connect() || err.is_request() {
        ReasoningError::Network(message)
    } else {
        ReasoningError::Other(message)
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// `Retry-After` in delta-seconds form; HTTP dates are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
