use super::EmbeddingProvider;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};

/// Local ONNX embedding provider backed by fastembed
pub struct FastEmbedManager {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: usize,
}

/// Model names accepted in configuration
fn lookup_model(name: &str) -> Option<(EmbeddingModel, usize)> {
    match name {
        "all-MiniLM-L6-v2" => Some((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-MiniLM-L12-v2" => Some((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Some((EmbeddingModel::NomicEmbedTextV15, 768)),
        _ => None,
    }
}

impl FastEmbedManager {
    /// Create a manager for a configured model name
    pub fn from_model_name(name: &str) -> Result<Self, EmbeddingError> {
        let (model, dimension) =
            lookup_model(name).ok_or_else(|| EmbeddingError::ModelNotFound(name.to_string()))?;

        tracing::info!("Initializing FastEmbed model: {:?}", model);

        let mut options = InitOptions::default();
        options.model_name = model;
        options.show_download_progress = true;

        let embedding_model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitializationFailed(e.to_string()))?;

        Ok(Self {
            model: Arc::new(Mutex::new(embedding_model)),
            model_name: name.to_string(),
            dimension,
        })
    }

    async fn run(&self, text: String) -> Result<Vec<f32>, EmbeddingError> {
        let model = Arc::clone(&self.model);
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut guard = model
                .lock()
                .map_err(|_| EmbeddingError::InvalidResponse("model lock poisoned".to_string()))?;
            guard
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))
        })
        .await
        .map_err(|e| EmbeddingError::InvalidResponse(format!("embedding task failed: {}", e)))??;

        embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding returned".to_string()))
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedManager {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.run(text.to_string()).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn test_connection(&self) -> Result<usize, EmbeddingError> {
        let probe = self.run("test".to_string()).await?;
        if probe.len() != self.dimension {
            return Err(EmbeddingError::InvalidResponse(format!(
                "model produced {} dimensions, expected {}",
                probe.len(),
                self.dimension
            )));
        }
        Ok(probe.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_models() {
        assert_eq!(lookup_model("all-MiniLM-L6-v2").map(|m| m.1), Some(384));
        assert_eq!(lookup_model("bge-base-en-v1.5").map(|m| m.1), Some(768));
        assert!(lookup_model("nomic-embed-text").is_none());
    }

    #[test]
    fn test_unknown_model_is_model_not_found() {
        let err = FastEmbedManager::from_model_name("made-up").err().unwrap();
        assert!(matches!(err, EmbeddingError::ModelNotFound(_)));
    }
}
