mod fastembed_manager;
mod ollama;

pub use fastembed_manager::FastEmbedManager;
pub use ollama::OllamaEmbedder;

use crate::config::EmbeddingConfig;
use crate::error::{EmbeddingError, SemdexError};
use async_trait::async_trait;
use std::sync::Arc;

/// Converts text into vectors of one embedding space
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Dimensionality of the vectors this provider produces.
    ///
    /// Only authoritative after a successful [`test_connection`](Self::test_connection).
    fn dimension(&self) -> usize;

    /// Model identity recorded with the embedding space
    fn model_name(&self) -> &str;

    /// Probe the model once and record the observed dimensionality
    async fn test_connection(&self) -> Result<usize, EmbeddingError>;
}

/// Build the provider selected by configuration
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, SemdexError> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "fastembed" => Ok(Arc::new(FastEmbedManager::from_model_name(&config.model_name)?)),
        other => Err(SemdexError::Config(crate::error::ConfigError::InvalidValue {
            key: "embedding.provider".to_string(),
            reason: format!("unknown provider '{}'", other),
        })),
    }
}
