use crate::config::Config;
use crate::error::{RepomindError, Result, ValidationError};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_chunking(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_ingest(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RepomindError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != "1.0.0" {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_chunking(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.chunking.max_chunk_size == 0 {
            errors.push(ValidationError::new(
                "chunking.max_chunk_size",
                "Max chunk size must be greater than 0",
            ));
        }

        if config.chunking.min_chunk_size >= config.chunking.max_chunk_size {
            errors.push(ValidationError::new(
                "chunking.min_chunk_size",
                "Min chunk size must be smaller than max chunk size",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if config.embedding.max_concurrent == 0 {
            errors.push(ValidationError::new(
                "embedding.max_concurrent",
                "Concurrency must be greater than 0",
            ));
        }
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.retrieval.top_k == 0 {
            errors.push(ValidationError::new(
                "retrieval.top_k",
                "Top-k must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&config.retrieval.min_score) {
            errors.push(ValidationError::new(
                "retrieval.min_score",
                "Min score must be between 0.0 and 1.0",
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.generation.timeout_secs == 0 {
            errors.push(ValidationError::new(
                "generation.timeout_secs",
                "Timeout must be greater than 0",
            ));
        }

        if !(0.0..=2.0).contains(&config.generation.temperature) {
            errors.push(ValidationError::new(
                "generation.temperature",
                "Temperature must be between 0.0 and 2.0",
            ));
        }

        if config.generation.gemini_model.is_empty() || config.generation.groq_model.is_empty() {
            errors.push(ValidationError::new(
                "generation",
                "Backend model ids cannot be empty",
            ));
        }
    }

    fn validate_ingest(config: &Config, errors: &mut Vec<ValidationError>) {
        if !(0.0..=1.0).contains(&config.ingest.max_failure_rate) {
            errors.push(ValidationError::new(
                "ingest.max_failure_rate",
                "Failure rate threshold must be between 0.0 and 1.0",
            ));
        }

        if config.ingest.summary_sample_limit == 0 {
            errors.push(ValidationError::new(
                "ingest.summary_sample_limit",
                "Summary sample limit must be greater than 0",
            ));
        }
    }
}
