//! Query-time operations against published sessions
//!
//! Read-only: looks up the session, retrieves grounding chunks, assembles
//! the bounded prompt, and dispatches to the session's generation backend.
//! Runs with unlimited concurrency across and within sessions since
//! published sessions are immutable.

use crate::error::{RepomindError, Result};
use crate::generation::{generate_with_policy, GenerationConfig, GenerationTask};
use crate::prompt::PromptAssembler;
use crate::retrieval::{RetrievalConfig, Retriever};
use crate::session::SessionStore;

/// A grounded question about one issue in a session
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub key: String,
    pub issue_id: u64,
    pub question: String,
}

/// Answer a question about an issue, grounded in the session's index.
///
/// Fails with `SessionNotFound` for unknown or cleaned-up keys and with the
/// generation error kind (timeout, unavailable, rejected) when the backend
/// fails after retries; a failure is never converted into an empty answer.
pub async fn answer(
    store: &SessionStore,
    request: &AnswerRequest,
    retrieval: &RetrievalConfig,
    generation: &GenerationConfig,
) -> Result<String> {
    let session = store.get(&request.key)?;

    let issue = session
        .find_issue(request.issue_id)
        .ok_or(RepomindError::IssueNotFound {
            id: request.issue_id,
        })?
        .clone();

    // Ground retrieval on the question; an empty question falls back to the
    // issue body, which is what the issue context is about
    let query_text = if request.question.trim().is_empty() {
        issue.body.clone()
    } else {
        request.question.clone()
    };

    let retriever = Retriever::new(retrieval.clone());
    let chunks = if query_text.trim().is_empty() {
        Vec::new()
    } else {
        retriever.retrieve(&session, &query_text)?
    };

    tracing::debug!(
        "Retrieved {} chunks for issue #{} in {}",
        chunks.len(),
        request.issue_id,
        request.key
    );

    let budget = session.backend.budget();
    let prompt =
        PromptAssembler::assemble_answer_prompt(&issue, &chunks, &request.question, &budget);

    let answer = generate_with_policy(
        session.backend.as_ref(),
        GenerationTask::Answer,
        &prompt,
        generation.timeout(),
        &generation.retry_policy(),
    )
    .await?;

    Ok(answer)
}

/// Return a session's cached summary, if ingestion produced one
pub fn summary(store: &SessionStore, key: &str) -> Result<Option<String>> {
    Ok(store.get(key)?.summary.clone())
}
