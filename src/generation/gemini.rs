//! Gemini generation backend (generateContent REST API)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{error_for_status, GenerationBackend, GenerationError};
use crate::prompt::{PromptBudget, PromptPayload};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Prompt budget in characters. Gemini accepts far more context than this;
/// the cap keeps retrieval-grounded prompts focused and latency bounded.
const PROMPT_BUDGET_CHARS: usize = 48_000;

pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl GeminiBackend {
    pub fn new(api_key: String, model: String, temperature: f32) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            temperature,
        }
    }

    async fn generate(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            API_BASE, self.model, self.api_key
        );

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt.text }]
            }],
            "generationConfig": {
                "temperature": self.temperature
            }
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status("gemini", status, body));
        }

        let parsed: GenerateContentResponse = response.json().await?;

        if let Some(feedback) = parsed.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                return Err(GenerationError::Rejected(format!(
                    "gemini blocked prompt: {}",
                    reason
                )));
            }
        }

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(GenerationError::EmptyResponse { provider: "gemini" });
        }

        Ok(text)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn budget(&self) -> PromptBudget {
        PromptBudget::chars(PROMPT_BUDGET_CHARS)
    }

    async fn summarize(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        self.generate(prompt).await
    }

    async fn answer(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        self.generate(prompt).await
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}
