//! Generation backend abstraction
//!
//! Polymorphic interface over text-generation providers. Every backend
//! exposes the same two operations (summarize, answer) and declares its own
//! context budget; context size, rate limits, and error mapping are
//! configuration data on each concrete backend rather than branching logic in
//! callers. The backend for a session is chosen at ingestion time and fixed
//! for the session's lifetime.

mod gemini;
mod groq;
mod mock;

pub use gemini::GeminiBackend;
pub use groq::{GroqBackend, TokenRateLimiter};
pub use mock::MockBackend;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prompt::{PromptBudget, PromptPayload};
use crate::retry::RetryPolicy;

#[derive(Error, Debug)]
pub enum GenerationError {
    /// Transient provider failure (unreachable, rate-limited, 5xx).
    /// Retried with backoff before being surfaced.
    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its deadline. Retried, then surfaced; never
    /// converted into an empty answer.
    #[error("Generation timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The provider judged the input unsafe or invalid. Not retried.
    #[error("Generation request rejected: {0}")]
    Rejected(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Response parse failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("API key environment variable {env} is not set")]
    MissingApiKey { env: String },
}

impl GenerationError {
    /// Whether a retry can plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GenerationError::Unavailable(_)
                | GenerationError::Timeout { .. }
                | GenerationError::Http(_)
        )
    }
}

/// A pluggable text-generation provider
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Backend name for logs and session listings
    fn name(&self) -> &str;

    /// Context budget in the backend's native unit
    fn budget(&self) -> PromptBudget;

    /// Produce a repository summary from a summary prompt
    async fn summarize(&self, prompt: &PromptPayload) -> Result<String, GenerationError>;

    /// Answer a grounded question
    async fn answer(&self, prompt: &PromptPayload) -> Result<String, GenerationError>;
}

/// Concrete backend selection, fixed per session at ingestion time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Gemini,
    Groq,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Gemini, BackendKind::Groq];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::Groq => "groq",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(BackendKind::Gemini),
            "groq" => Ok(BackendKind::Groq),
            other => Err(format!(
                "unknown backend '{}', expected one of: gemini, groq",
                other
            )),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Default backend for new sessions
    pub backend: BackendKind,
    /// Environment variable holding the Gemini API key
    pub gemini_api_key_env: String,
    /// Gemini model id
    pub gemini_model: String,
    /// Environment variable holding the Groq API key
    pub groq_api_key_env: String,
    /// Groq model id
    pub groq_model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Per-call deadline in seconds
    pub timeout_secs: u64,
    /// Retry attempts for transient failures
    pub max_retries: u32,
    /// Base backoff delay in milliseconds (doubles per attempt)
    pub retry_base_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Groq,
            gemini_api_key_env: "GEMINI_API_KEY".to_string(),
            gemini_model: "gemini-2.5-flash-lite".to_string(),
            groq_api_key_env: "GROQ_API_KEY".to_string(),
            groq_model: "openai/gpt-oss-120b".to_string(),
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 2,
            retry_base_ms: 1000,
        }
    }
}

impl GenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries.max(1),
            Duration::from_millis(self.retry_base_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Build the configured concrete backend, reading its API key from the
/// environment
pub fn build_backend(
    kind: BackendKind,
    config: &GenerationConfig,
) -> Result<Arc<dyn GenerationBackend>, GenerationError> {
    let api_key = |env: &str| {
        std::env::var(env).map_err(|_| GenerationError::MissingApiKey {
            env: env.to_string(),
        })
    };

    match kind {
        BackendKind::Gemini => {
            let key = api_key(&config.gemini_api_key_env)?;
            Ok(Arc::new(GeminiBackend::new(
                key,
                config.gemini_model.clone(),
                config.temperature,
            )))
        }
        BackendKind::Groq => {
            let key = api_key(&config.groq_api_key_env)?;
            Ok(Arc::new(GroqBackend::new(
                key,
                config.groq_model.clone(),
                config.temperature,
            )))
        }
    }
}

/// Which of the two backend operations to dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationTask {
    Summarize,
    Answer,
}

/// Dispatch one generation call under the session's timeout and retry policy.
///
/// Transient failures (unavailable, timeout, transport) are retried with
/// bounded backoff; rejections are surfaced immediately. A timeout is always
/// surfaced as `Timeout`, never as an empty result.
pub async fn generate_with_policy(
    backend: &dyn GenerationBackend,
    task: GenerationTask,
    prompt: &PromptPayload,
    timeout: Duration,
    retry: &RetryPolicy,
) -> Result<String, GenerationError> {
    let what = match task {
        GenerationTask::Summarize => "summarize",
        GenerationTask::Answer => "answer",
    };

    retry
        .run(what, GenerationError::is_transient, || async {
            let call = async {
                match task {
                    GenerationTask::Summarize => backend.summarize(prompt).await,
                    GenerationTask::Answer => backend.answer(prompt).await,
                }
            };
            match tokio::time::timeout(timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::Timeout {
                    secs: timeout.as_secs(),
                }),
            }
        })
        .await
}

/// Map an HTTP status to the generation error taxonomy.
///
/// 429 and 5xx are transient; 400/403/422 indicate the provider rejected the
/// input and are never retried.
pub(crate) fn error_for_status(
    provider: &'static str,
    status: reqwest::StatusCode,
    body: String,
) -> GenerationError {
    use reqwest::StatusCode;

    if status == StatusCode::TOO_MANY_REQUESTS {
        GenerationError::Unavailable(format!("{} rate limited: {}", provider, body))
    } else if status == StatusCode::BAD_REQUEST
        || status == StatusCode::FORBIDDEN
        || status == StatusCode::UNPROCESSABLE_ENTITY
    {
        GenerationError::Rejected(format!("{} rejected request ({}): {}", provider, status, body))
    } else {
        GenerationError::Unavailable(format!("{} returned {}: {}", provider, status, body))
    }
}
