//! Grounded prompt assembly
//!
//! Merges issue context, retrieved chunks, and the user question (or the
//! summary directive) into a single prompt bounded by the generation
//! backend's declared budget. Section ordering is a design contract: issue
//! title, issue body, issue comments in chronological order, retrieved chunks
//! highest score first (each tagged with its originating path), then the
//! question. Reorderings change what the backend weights and are not
//! cosmetic.

use serde::{Deserialize, Serialize};

use crate::chunker::Chunk;
use crate::ingest::Issue;
use crate::retrieval::ScoredChunk;

/// Rough chars-per-token ratio used when a backend budgets in tokens
const CHARS_PER_TOKEN: usize = 4;

/// Unit a generation backend expresses its context budget in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    Chars,
    Tokens,
}

/// Size budget declared by a generation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptBudget {
    pub unit: BudgetUnit,
    pub limit: usize,
}

impl PromptBudget {
    pub fn chars(limit: usize) -> Self {
        Self {
            unit: BudgetUnit::Chars,
            limit,
        }
    }

    pub fn tokens(limit: usize) -> Self {
        Self {
            unit: BudgetUnit::Tokens,
            limit,
        }
    }

    /// Measure `text` in this budget's unit
    pub fn measure(&self, text: &str) -> usize {
        let chars = text.chars().count();
        match self.unit {
            BudgetUnit::Chars => chars,
            BudgetUnit::Tokens => chars.div_ceil(CHARS_PER_TOKEN),
        }
    }

    pub fn fits(&self, text: &str) -> bool {
        self.measure(text) <= self.limit
    }

    fn chars_per_unit(&self) -> usize {
        match self.unit {
            BudgetUnit::Chars => 1,
            BudgetUnit::Tokens => CHARS_PER_TOKEN,
        }
    }
}

/// An assembled prompt, sized within the owning backend's budget
#[derive(Debug, Clone)]
pub struct PromptPayload {
    /// Full prompt text
    pub text: String,
    /// Size of `text` in the budget's unit
    pub size: usize,
    /// Ids of the chunks that survived budget trimming, highest score first
    pub included_chunks: Vec<u64>,
}

/// Assembles size-bounded grounded prompts
pub struct PromptAssembler;

impl PromptAssembler {
    /// Build the prompt for answering a question about an issue.
    ///
    /// `chunks` must be sorted by decreasing score (the retriever's output
    /// order). When the assembled text exceeds the budget, chunks are dropped
    /// lowest-score-first; if the issue text alone exceeds the budget it is
    /// truncated from the end. The question and task instructions are always
    /// kept.
    pub fn assemble_answer_prompt(
        issue: &Issue,
        chunks: &[ScoredChunk],
        question: &str,
        budget: &PromptBudget,
    ) -> PromptPayload {
        let preamble =
            "You are an expert software engineering assistant that helps resolve repository issues.\n\n";
        let mut issue_section = format!("### Issue #{}: {}\n{}\n", issue.id, issue.title, issue.body);
        for comment in &issue.comments {
            issue_section.push_str("\n#### Comment\n");
            issue_section.push_str(comment);
            issue_section.push('\n');
        }

        let footer = format!(
            "\nYour task:\n\
             - Analyze the provided context and the issue.\n\
             - Suggest precise code changes or fixes.\n\
             - Provide reasoning and corrected snippets.\n\
             - Keep the formatting concise and professional.\n\n\
             ### Question\n{}\n",
            question
        );

        let mut selected: Vec<&ScoredChunk> = chunks.iter().collect();

        loop {
            let text = render_answer(preamble, &issue_section, &selected, &footer);
            if budget.fits(&text) {
                let size = budget.measure(&text);
                return PromptPayload {
                    text,
                    size,
                    included_chunks: selected.iter().map(|s| s.chunk.id).collect(),
                };
            }

            if selected.pop().is_none() {
                // No chunks left: trim the issue text from the end until the
                // remainder fits, then fall back to trimming the whole text.
                let excess = budget.measure(&text).saturating_sub(budget.limit);
                let cut = excess.max(1) * budget.chars_per_unit();
                if issue_section.is_empty() {
                    let trimmed = truncate_chars(&text, budget.limit * budget.chars_per_unit());
                    let size = budget.measure(&trimmed);
                    return PromptPayload {
                        text: trimmed,
                        size,
                        included_chunks: Vec::new(),
                    };
                }
                let keep = issue_section.chars().count().saturating_sub(cut);
                issue_section = truncate_chars(&issue_section, keep);
            }
        }
    }

    /// Build the ingestion-time summary prompt from a sampled chunk set.
    ///
    /// `sampled` is in sampling priority order; when the budget is exceeded,
    /// the lowest-priority samples are dropped from the end.
    pub fn assemble_summary_prompt(sampled: &[Chunk], budget: &PromptBudget) -> PromptPayload {
        let header = "You are an expert software engineer who writes clear, concise technical summaries.\n\n\
             Based on the following repository sample, provide a comprehensive yet concise summary \
             of approximately 500 words covering:\n\
             1. Project overview\n\
             2. Technology stack\n\
             3. Codebase structure\n\
             4. Key components\n\
             5. Purpose and functionality\n\
             6. Reported issues or ongoing work\n\n\
             ### Repository sample\n";

        let mut count = sampled.len();
        loop {
            let text = render_summary(header, &sampled[..count]);
            if budget.fits(&text) || count == 0 {
                let text = if budget.fits(&text) {
                    text
                } else {
                    truncate_chars(&text, budget.limit * budget.chars_per_unit())
                };
                let size = budget.measure(&text);
                return PromptPayload {
                    text,
                    size,
                    included_chunks: sampled[..count].iter().map(|c| c.id).collect(),
                };
            }
            count -= 1;
        }
    }
}

fn render_answer(
    preamble: &str,
    issue_section: &str,
    selected: &[&ScoredChunk],
    footer: &str,
) -> String {
    let mut text = String::from(preamble);
    text.push_str(issue_section);
    if !selected.is_empty() {
        text.push_str("\n### Relevant repository context\n");
        for scored in selected {
            push_chunk_block(&mut text, &scored.chunk);
        }
    }
    text.push_str(footer);
    text
}

fn render_summary(header: &str, sampled: &[Chunk]) -> String {
    let mut text = String::from(header);
    for chunk in sampled {
        push_chunk_block(&mut text, chunk);
    }
    text
}

fn push_chunk_block(text: &mut String, chunk: &Chunk) {
    text.push_str(&format!(
        "\n#### {} (lines {}-{})\n```\n{}\n```\n",
        chunk.origin.label(),
        chunk.start_line,
        chunk.end_line,
        chunk.text
    ));
}

/// Keep at most `max_chars` characters, cutting from the end
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
