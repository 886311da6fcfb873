//! Embedding client for a local Ollama server

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Dimensionality assumed until the model has been probed
const DEFAULT_DIMENSION: usize = 768;

pub struct OllamaEmbedder {
    client: Client,
    host: String,
    endpoint: String,
    model: String,
    dimension: AtomicUsize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                EmbeddingError::InitializationFailed(format!("failed to build HTTP client: {}", e))
            })?;
        let host = config.ollama_host.trim_end_matches('/').to_string();
        let endpoint = format!("{}/api/embed", host);

        tracing::debug!(
            "OllamaEmbedder initialized with host={}, model={}",
            host,
            config.model_name
        );

        Ok(Self {
            client,
            host,
            endpoint,
            model: config.model_name.clone(),
            dimension: AtomicUsize::new(DEFAULT_DIMENSION),
        })
    }

    async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let request = EmbedRequest {
            model: &self.model,
            input: text,
            truncate: false,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_status(status, &self.model, &body));
        }

        let parsed: EmbedResponse = resp.json().await.map_err(|e| {
            EmbeddingError::InvalidResponse(format!("failed to parse embed response: {}", e))
        })?;

        let embedding = parsed
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty embedding returned".to_string()))?;

        Ok(embedding)
    }

    fn transport_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            tracing::error!("Cannot connect to Ollama at {}. Is it running?", self.host);
            EmbeddingError::ConnectionFailed {
                endpoint: self.host.clone(),
                reason: err.to_string(),
            }
        } else {
            EmbeddingError::InvalidResponse(err.to_string())
        }
    }
}

/// Map a non-success HTTP status onto an error kind
fn classify_status(status: StatusCode, model: &str, body: &str) -> EmbeddingError {
    match status {
        StatusCode::NOT_FOUND => {
            tracing::error!("Model '{}' not found. Run: ollama pull {}", model, model);
            EmbeddingError::ModelNotFound(model.to_string())
        }
        // With truncate disabled the only input-dependent rejection is an overlong text
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => {
            EmbeddingError::ContextLengthExceeded(model.to_string())
        }
        _ => EmbeddingError::InvalidResponse(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embedding = self.request(text).await?;

        let previous = self.dimension.swap(embedding.len(), Ordering::Relaxed);
        if previous != embedding.len() {
            tracing::debug!("Updated embedding dimensions to {}", embedding.len());
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn test_connection(&self) -> Result<usize, EmbeddingError> {
        let probe = self.request("test").await?;
        self.dimension.store(probe.len(), Ordering::Relaxed);
        tracing::debug!(
            "Ollama connection test successful, dimensions={}",
            probe.len()
        );
        Ok(probe.len())
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}
