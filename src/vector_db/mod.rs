// LanceDB is the embedded vector database backing the index
pub mod lance_store;
pub mod space;

pub use lance_store::LanceStore;
pub use space::{SpaceDecision, SpaceStore, ensure_embedding_space};

use crate::types::{IndexedDocument, ScoredDocument};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Document store holding one embedding per path, in one embedding space
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the document table at `dimension` if it does not exist yet
    async fn initialize(&self, dimension: usize) -> Result<()>;

    /// Drop every document and recreate the table at `dimension`
    async fn reset(&self, dimension: usize) -> Result<()>;

    /// Dimensionality of the existing table, if any
    async fn dimension(&self) -> Result<Option<usize>>;

    async fn insert(&self, doc: &IndexedDocument) -> Result<()>;

    /// Replace the document stored for `doc.path` atomically.
    /// Inserts when no document exists for the path.
    async fn update(&self, doc: &IndexedDocument) -> Result<()>;

    /// Returns false if nothing was stored for `path`
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Remove every document under `root`, returning how many were removed
    async fn delete_by_prefix(&self, root: &str) -> Result<usize>;

    async fn find_by_path(&self, path: &str) -> Result<Option<IndexedDocument>>;

    async fn find_all(&self) -> Result<Vec<IndexedDocument>>;

    /// Stored `file_modified_at` of every indexed path
    async fn indexed_timestamps(&self) -> Result<HashMap<String, DateTime<Utc>>>;

    /// Nearest neighbours of `vector` by L2 distance, best first, at most `k`.
    /// With `prefix`, only documents under that directory are returned.
    async fn find_similar(
        &self,
        vector: &[f32],
        k: usize,
        prefix: Option<&str>,
    ) -> Result<Vec<ScoredDocument>>;

    async fn count(&self) -> Result<usize>;

    async fn count_by_prefix(&self, root: &str) -> Result<usize>;

    /// Drop every document, keeping the current dimensionality
    async fn clear(&self) -> Result<()>;
}

/// Similarity score for an L2 distance: 1 at distance 0, falling towards 0
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}
