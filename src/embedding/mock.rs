//! Test-only mock embedding provider.
//!
//! Produces deterministic pseudo-embeddings derived from a BLAKE3 digest of
//! the input text, so identical text always maps to the identical vector and
//! tests can assert exact retrieval behavior without model downloads.
//! Failures are injectable per-text to exercise the retry-then-drop path.

use super::{EmbeddingError, EmbeddingProvider};

#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
    /// Texts containing this substring fail with `Unavailable` on every call
    fail_substring: Option<String>,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_substring: None,
        }
    }

    /// Fail any embed call whose text contains `needle`
    #[must_use]
    pub fn failing_on(mut self, needle: impl Into<String>) -> Self {
        self.fail_substring = Some(needle.into());
        self
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        let mut reader = hasher.finalize_xof();

        let mut bytes = vec![0u8; self.dimension * 4];
        reader.fill(&mut bytes);

        bytes
            .chunks_exact(4)
            .map(|b| {
                let raw = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                // Map to [-1.0, 1.0)
                (raw as f32 / u32::MAX as f32) * 2.0 - 1.0
            })
            .collect()
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(needle) = &self.fail_substring {
            if text.contains(needle.as_str()) {
                return Err(EmbeddingError::Unavailable(format!(
                    "mock failure for text containing {:?}",
                    needle
                )));
            }
        }
        Ok(self.vector_for(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        dot / (mag_a * mag_b)
    }

    #[test]
    fn test_same_text_same_vector() {
        let provider = MockEmbeddingProvider::new(64);
        let a = provider.embed("fn main() {}").unwrap();
        let b = provider.embed("fn main() {}").unwrap();
        assert_eq!(a, b);
        assert!(cosine(&a, &b) > 0.999);
    }

    #[test]
    fn test_different_text_different_vector() {
        let provider = MockEmbeddingProvider::new(64);
        let a = provider.embed("alpha").unwrap();
        let b = provider.embed("beta").unwrap();
        assert!(cosine(&a, &b) < 0.9);
    }

    #[test]
    fn test_dimension_respected() {
        let provider = MockEmbeddingProvider::new(17);
        assert_eq!(provider.embed("x").unwrap().len(), 17);
        assert_eq!(provider.dimension(), 17);
    }

    #[test]
    fn test_failure_injection() {
        let provider = MockEmbeddingProvider::new(8).failing_on("poison");
        assert!(provider.embed("clean text").is_ok());
        let err = provider.embed("some poison here").unwrap_err();
        assert!(err.is_transient());

        let texts = vec!["ok".to_string(), "poison".to_string()];
        assert!(provider.embed_batch(&texts).is_err());
    }
}
