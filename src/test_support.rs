//! Deterministic embedding provider for unit tests

use crate::embedding::EmbeddingProvider;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Text containing this marker is rejected as too long
pub const TOO_LONG: &str = "@@too-long@@";
/// Text containing this marker fails as if the service were down
pub const UNREACHABLE: &str = "@@unreachable@@";

/// Bag-of-words embedder: each word bumps one hashed bucket, then the vector is normalized
pub struct HashEmbedder {
    model: String,
    dimension: usize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(model: &str, dimension: usize) -> Self {
        Self {
            model: model.to_string(),
            dimension,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        for word in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            v[(hasher.finish() as usize) % self.dimension] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains(TOO_LONG) {
            return Err(EmbeddingError::ContextLengthExceeded(self.model.clone()));
        }
        if text.contains(UNREACHABLE) {
            return Err(EmbeddingError::ConnectionFailed {
                endpoint: "test".to_string(),
                reason: "down".to_string(),
            });
        }
        Ok(self.vector(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn test_connection(&self) -> Result<usize, EmbeddingError> {
        Ok(self.dimension)
    }
}
