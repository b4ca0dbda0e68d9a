//! Groq generation backend (OpenAI-compatible chat completions API)

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{error_for_status, GenerationBackend, GenerationError};
use crate::prompt::{PromptBudget, PromptPayload};

const API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Input budget in tokens: the model's input window minus a margin reserved
/// for the completion.
const MAX_INPUT_TOKENS: usize = 6000;
const RESERVED_OUTPUT_TOKENS: usize = 400;

const MAX_COMPLETION_TOKENS: u32 = 1024;

const SYSTEM_PROMPT: &str =
    "You are an expert software engineer who provides clear, concise technical answers.";

/// Default tokens-per-minute allowance
const TPM_LIMIT: usize = 8000;
const TPM_WINDOW: Duration = Duration::from_secs(60);

/// Sliding-window token budget.
///
/// Tracks tokens spent over the trailing window; `allow` answers whether a
/// request of the given size fits and records it when it does.
pub struct TokenRateLimiter {
    token_limit: usize,
    window: Duration,
    events: Mutex<VecDeque<(Instant, usize)>>,
}

impl TokenRateLimiter {
    pub fn new(token_limit: usize, window: Duration) -> Self {
        Self {
            token_limit,
            window,
            events: Mutex::new(VecDeque::new()),
        }
    }

    /// Try to reserve `tokens` from the window budget
    pub fn allow(&self, tokens: usize) -> bool {
        let now = Instant::now();
        let mut events = self.events.lock().unwrap();

        while let Some((stamp, _)) = events.front() {
            if now.duration_since(*stamp) > self.window {
                events.pop_front();
            } else {
                break;
            }
        }

        let spent: usize = events.iter().map(|(_, t)| *t).sum();
        if spent + tokens > self.token_limit {
            return false;
        }
        events.push_back((now, tokens));
        true
    }
}

impl Default for TokenRateLimiter {
    fn default() -> Self {
        Self::new(TPM_LIMIT, TPM_WINDOW)
    }
}

pub struct GroqBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    limiter: TokenRateLimiter,
}

impl GroqBackend {
    pub fn new(api_key: String, model: String, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            temperature,
            limiter: TokenRateLimiter::default(),
        }
    }

    async fn generate(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        if !self.limiter.allow(prompt.size) {
            return Err(GenerationError::Unavailable(
                "groq token-per-minute budget exhausted".to_string(),
            ));
        }

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt.text }
            ],
            "temperature": self.temperature,
            "max_tokens": MAX_COMPLETION_TOKENS
        });

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status("groq", status, body));
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenerationError::EmptyResponse { provider: "groq" });
        }

        Ok(text)
    }
}

#[async_trait]
impl GenerationBackend for GroqBackend {
    fn name(&self) -> &str {
        "groq"
    }

    fn budget(&self) -> PromptBudget {
        PromptBudget::tokens(MAX_INPUT_TOKENS - RESERVED_OUTPUT_TOKENS)
    }

    async fn summarize(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        self.generate(prompt).await
    }

    async fn answer(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        self.generate(prompt).await
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
