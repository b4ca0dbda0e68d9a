//! Semantic retrieval over a published session
//!
//! Embeds the query with the session's own embedding provider, ranks indexed
//! chunks by cosine similarity, applies the minimum-score threshold, and
//! deduplicates overlapping same-origin chunks before returning.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunker::Chunk;
use crate::session::Session;

#[derive(Error, Debug)]
pub enum RetrieveError {
    #[error("Query embedding failed: {0}")]
    Embedding(String),

    #[error("Vector search failed: {0}")]
    VectorSearch(String),

    /// A ranked id with no chunk table entry; the bijection invariant rules
    /// this out for published sessions
    #[error("Chunk {id} missing from session chunk table")]
    MissingChunk { id: u64 },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// A chunk with its similarity score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity against the query (higher is more relevant)
    pub score: f32,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of candidates requested from the index
    pub top_k: usize,
    /// Candidates scoring below this are filtered out (with a fallback to
    /// the single best candidate so grounding never silently vanishes)
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 8,
            min_score: 0.25,
        }
    }
}

/// Retrieves relevant chunks for a query against one session
pub struct Retriever {
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// Retrieve with the configured `top_k` and `min_score`
    pub fn retrieve(&self, session: &Session, query: &str) -> Result<Vec<ScoredChunk>, RetrieveError> {
        self.retrieve_with(session, query, self.config.top_k, self.config.min_score)
    }

    /// Retrieve the top `k` chunks for `query`, filtered by `min_score`.
    ///
    /// Returns at most `k` chunks sorted by non-increasing score with no
    /// duplicate ids. An empty index yields an empty result (the prompt
    /// assembler proceeds ungrounded); a non-empty index always yields at
    /// least the single best candidate, even below the threshold.
    pub fn retrieve_with(
        &self,
        session: &Session,
        query: &str,
        k: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredChunk>, RetrieveError> {
        if query.is_empty() {
            return Err(RetrieveError::InvalidQuery(
                "Query text cannot be empty".to_string(),
            ));
        }

        if session.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = session
            .provider
            .embed(query)
            .map_err(|e| RetrieveError::Embedding(e.to_string()))?;

        let ranked = session
            .index
            .query(&query_embedding, k)
            .map_err(|e| RetrieveError::VectorSearch(e.to_string()))?;

        let mut candidates = Vec::with_capacity(ranked.len());
        for result in ranked {
            let chunk = session
                .chunks
                .get(&result.id)
                .ok_or(RetrieveError::MissingChunk { id: result.id })?;
            candidates.push(ScoredChunk {
                chunk: chunk.clone(),
                score: result.score,
            });
        }

        // Threshold, falling back to the best single candidate rather than
        // returning nothing
        let mut filtered: Vec<ScoredChunk> = candidates
            .iter()
            .filter(|c| c.score >= min_score)
            .cloned()
            .collect();
        if filtered.is_empty() {
            if let Some(best) = candidates.into_iter().next() {
                filtered.push(best);
            }
        }

        Ok(deduplicate_overlapping(filtered))
    }
}

/// Drop chunks that overlap (or sit adjacent to) an already-kept chunk from
/// the same origin, keeping the highest-scoring one.
///
/// Input must be sorted by decreasing score; output order is preserved.
pub fn deduplicate_overlapping(chunks: Vec<ScoredChunk>) -> Vec<ScoredChunk> {
    let mut kept: Vec<ScoredChunk> = Vec::with_capacity(chunks.len());

    for candidate in chunks {
        let duplicate = kept.iter().any(|existing| {
            existing.chunk.id == candidate.chunk.id
                || existing.chunk.overlaps(&candidate.chunk)
        });
        if !duplicate {
            kept.push(candidate);
        }
    }

    kept
}
