//! Test-only mock generation backend.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{GenerationBackend, GenerationError};
use crate::prompt::{PromptBudget, PromptPayload};

/// Failure mode injected into the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    None,
    /// Fail the first N calls with `Unavailable`, then succeed
    UnavailableTimes(u32),
    /// Reject every call
    Rejected,
}

pub struct MockBackend {
    response: String,
    budget: PromptBudget,
    failure: FailureMode,
    reject_reason: String,
    delay_ms: u64,
    calls: AtomicU32,
    /// Prompts received, for asserting on assembled content
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            budget: PromptBudget::chars(100_000),
            failure: FailureMode::None,
            reject_reason: String::new(),
            delay_ms: 0,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Mock that rejects every call
    pub fn rejecting(reason: impl Into<String>) -> Self {
        let mut mock = Self::new("");
        mock.failure = FailureMode::Rejected;
        mock.reject_reason = reason.into();
        mock
    }

    /// Fail the first `n` calls with a transient error
    #[must_use]
    pub fn failing_times(mut self, n: u32) -> Self {
        self.failure = FailureMode::UnavailableTimes(n);
        self
    }

    /// Sleep before answering, to trip call deadlines
    #[must_use]
    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Override the declared budget
    #[must_use]
    pub fn with_budget(mut self, budget: PromptBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Number of generate calls received
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far
    pub fn received_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    async fn generate(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.text.clone());

        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }

        match self.failure {
            FailureMode::None => Ok(self.response.clone()),
            FailureMode::UnavailableTimes(n) if call < n => Err(GenerationError::Unavailable(
                format!("mock unavailable (call {})", call + 1),
            )),
            FailureMode::UnavailableTimes(_) => Ok(self.response.clone()),
            FailureMode::Rejected => Err(GenerationError::Rejected(self.reject_reason.clone())),
        }
    }
}

#[async_trait]
impl GenerationBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn budget(&self) -> PromptBudget {
        self.budget
    }

    async fn summarize(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        self.generate(prompt).await
    }

    async fn answer(&self, prompt: &PromptPayload) -> Result<String, GenerationError> {
        self.generate(prompt).await
    }
}
