//! Core data model shared by the indexing pipeline and its callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// One indexed file together with its embedding
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    /// Absolute path, unique across the index
    pub path: String,
    /// Full text of the file at indexing time
    pub content: String,
    /// Vector produced by the active embedding space
    pub embedding: Vec<f32>,
    pub indexed_at: DateTime<Utc>,
    pub file_modified_at: DateTime<Utc>,
    pub file_size: u64,
}

impl IndexedDocument {
    /// Build a fresh document with a new id, stamped as indexed now
    pub fn new(
        path: impl Into<String>,
        content: impl Into<String>,
        embedding: Vec<f32>,
        file_modified_at: DateTime<Utc>,
        file_size: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            content: content.into(),
            embedding,
            indexed_at: Utc::now(),
            file_modified_at,
            file_size,
        }
    }
}

/// A document returned by similarity search
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: IndexedDocument,
    /// 1 / (1 + L2 distance)
    pub score: f32,
}

/// Why a path is waiting in the change queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeReason {
    New,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeReason::New => "new",
            ChangeReason::Modified => "modified",
            ChangeReason::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A pending change for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: String,
    pub reason: ChangeReason,
    #[serde(default)]
    pub mtime: Option<DateTime<Utc>>,
}

impl ChangeRecord {
    pub fn new(path: impl Into<String>, mtime: Option<DateTime<Utc>>) -> Self {
        Self {
            path: path.into(),
            reason: ChangeReason::New,
            mtime,
        }
    }

    pub fn modified(path: impl Into<String>, mtime: Option<DateTime<Utc>>) -> Self {
        Self {
            path: path.into(),
            reason: ChangeReason::Modified,
            mtime,
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: ChangeReason::Deleted,
            mtime: None,
        }
    }
}

/// A registered root directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directory {
    pub id: String,
    pub path: String,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub file_count: usize,
    #[serde(default)]
    pub last_indexed_at: Option<DateTime<Utc>>,
}

impl Directory {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path: path.into(),
            added_at: Utc::now(),
            file_count: 0,
            last_indexed_at: None,
        }
    }
}

/// The model and dimensionality every stored embedding belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSpace {
    pub model_name: String,
    pub dimensions: usize,
    pub created_at: DateTime<Utc>,
}

/// Summary of a batch indexing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingResult {
    pub indexed: usize,
    pub skipped: usize,
    pub errors: usize,
}

impl AddAssign for IndexingResult {
    fn add_assign(&mut self, other: Self) {
        self.indexed += other.indexed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

/// A single search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub path: String,
    pub content: String,
    pub score: f32,
}

impl From<ScoredDocument> for SearchResult {
    fn from(hit: ScoredDocument) -> Self {
        Self {
            path: hit.document.path,
            content: hit.document.content,
            score: hit.score,
        }
    }
}

/// Query-time knobs for text search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub limit: usize,
    /// Restrict hits to paths under this directory
    pub path: Option<String>,
    pub min_score: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            path: None,
            min_score: 0.0,
        }
    }
}

/// Outcome of registering a directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDirectoryResult {
    pub directory: Directory,
    /// Eligible files handed to the indexing pipeline
    pub queued_count: usize,
    pub already_registered: bool,
    /// Present when the files were indexed synchronously instead of queued
    #[serde(default)]
    pub indexed: Option<IndexingResult>,
}

/// Snapshot of the service for `status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub model_name: String,
    pub dimensions: usize,
    pub documents: usize,
    pub directories: usize,
    pub queue_size: usize,
    /// False when another process owns the writer lock
    pub writable: bool,
}

/// Convert to the millisecond precision timestamps are stored with
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}
