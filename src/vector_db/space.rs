//! Embedding space metadata and startup governance
//!
//! Every stored vector must come from the space recorded here. At startup the
//! configured model and the probed dimensionality are compared against the
//! recorded space and the store is reset when they disagree.

use crate::error::SemdexError;
use crate::registry::DirectoryRegistry;
use crate::types::EmbeddingSpace;
use crate::vector_db::VectorStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};

/// What startup governance did to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceDecision {
    /// No space was recorded; the store was created
    Initialized,
    /// Same model and dimensionality; nothing touched
    Unchanged,
    /// Same model reported a different dimensionality; documents dropped
    DimensionReset,
    /// Model changed; documents dropped and directory stats zeroed
    ModelChanged,
}

/// JSON file holding the active [`EmbeddingSpace`]
#[derive(Debug, Clone)]
pub struct SpaceStore {
    path: PathBuf,
}

impl SpaceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recorded space, if any
    ///
    /// An empty or unparsable file counts as no record, so governance
    /// rebuilds the store instead of refusing to start.
    pub fn load(&self) -> Result<Option<EmbeddingSpace>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&self.path).context("Failed to read embedding space file")?;
        match serde_json::from_str(&content) {
            Ok(space) => Ok(Some(space)),
            Err(e) => {
                tracing::warn!(
                    "Ignoring unreadable embedding space file {:?}: {}",
                    self.path,
                    e
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, space: &EmbeddingSpace) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create data directory")?;
        }

        let content =
            serde_json::to_string_pretty(space).context("Failed to serialize embedding space")?;

        // Write then rename so a crash never leaves a truncated record
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).context("Failed to write embedding space file")?;
        fs::rename(&tmp, &self.path).context("Failed to replace embedding space file")?;

        tracing::debug!("Saved embedding space to {:?}", self.path);
        Ok(())
    }
}

/// Bring the store into the configured embedding space before any mutation
pub async fn ensure_embedding_space(
    store: &dyn VectorStore,
    spaces: &SpaceStore,
    registry: &DirectoryRegistry,
    model_name: &str,
    dimensions: usize,
) -> Result<SpaceDecision, SemdexError> {
    let recorded = spaces.load()?;
    let table_dimension = store.dimension().await?;

    let decision = match &recorded {
        None => {
            tracing::info!(
                "Initializing embedding space: model={}, dimensions={}",
                model_name,
                dimensions
            );
            // A table without recorded metadata cannot be trusted
            if table_dimension.is_some() {
                store.reset(dimensions).await?;
            } else {
                store.initialize(dimensions).await?;
            }
            SpaceDecision::Initialized
        }
        Some(space) if space.model_name != model_name => {
            tracing::warn!(
                "Embedding model changed from '{}' to '{}', resetting index",
                space.model_name,
                model_name
            );
            store.reset(dimensions).await?;
            registry.reset_stats().await?;
            SpaceDecision::ModelChanged
        }
        Some(space) if space.dimensions == dimensions && table_dimension.is_none() => {
            tracing::info!("Document table missing, recreating at {} dimensions", dimensions);
            store.initialize(dimensions).await?;
            return Ok(SpaceDecision::Unchanged);
        }
        Some(space) if space.dimensions != dimensions || table_dimension != Some(dimensions) => {
            tracing::warn!(
                "Embedding dimensions changed from {} to {} for model '{}', resetting index",
                space.dimensions,
                dimensions,
                model_name
            );
            store.reset(dimensions).await?;
            SpaceDecision::DimensionReset
        }
        Some(_) => {
            tracing::debug!("Embedding space unchanged: {} ({})", model_name, dimensions);
            return Ok(SpaceDecision::Unchanged);
        }
    };

    spaces.save(&EmbeddingSpace {
        model_name: model_name.to_string(),
        dimensions,
        created_at: Utc::now(),
    })?;

    Ok(decision)
}
