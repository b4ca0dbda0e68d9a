//! Embedding & indexing
//!
//! Architecture:
//! - EmbeddingProvider trait for abstraction over embedding backends
//! - FastEmbedProvider for local embedding (all-MiniLM-L6-v2, 384-dim)
//! - Exact cosine flat index for similarity search
//! - MockEmbeddingProvider for deterministic tests

mod mock;
mod provider;
mod vector_index;

pub use mock::MockEmbeddingProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use vector_index::{SearchResult, VectorIndex, VectorIndexError};

use serde::{Deserialize, Serialize};

/// Configuration for embedding generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name (e.g., "all-MiniLM-L6-v2")
    pub model: String,
    /// Batch size for embed_batch calls
    pub batch_size: usize,
    /// Maximum concurrent embedding batches during ingestion
    pub max_concurrent: usize,
    /// Retry attempts for transient provider failures
    pub max_retries: u32,
    /// Base backoff delay in milliseconds (doubles per attempt)
    pub retry_base_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "all-MiniLM-L6-v2".to_string(),
            batch_size: 32,
            max_concurrent: 4,
            max_retries: 3,
            retry_base_ms: 250,
        }
    }
}
