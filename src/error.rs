use thiserror::Error;

use crate::chunker::ChunkerError;
use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::generation::GenerationError;
use crate::ingest::FetchError;
use crate::retrieval::RetrieveError;
use crate::session::SessionError;

/// Main error type for the repomind application
#[derive(Error, Debug)]
pub enum RepomindError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: std::path::PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Repository or issue fetch failures (ingestion aborts, nothing published)
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Content that cannot be chunked (non-decodable source unit)
    #[error("Chunker error: {0}")]
    Chunker(#[from] ChunkerError),

    /// Embedding provider failures
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index failures
    #[error("Vector index error: {0}")]
    Index(#[from] VectorIndexError),

    /// Ingestion aborted before publish (e.g. embedding drop rate over threshold)
    #[error("Ingestion failed: {reason}")]
    IngestFailed { reason: String },

    /// Session lifecycle errors (not found, duplicate build)
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Retrieval failures
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrieveError),

    /// Generation backend failures
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Requested issue id is not part of the session
    #[error("Issue not found: {id}")]
    IssueNotFound { id: u64 },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for repomind operations
pub type Result<T> = std::result::Result<T, RepomindError>;
