//! # semdex - Local Semantic Search Daemon
//!
//! Watches registered directories, embeds their text files with a local
//! model and answers nearest-neighbor queries over the resulting index.
//!
//! ## Overview
//!
//! Every eligible file becomes one document (path, content, embedding) in an
//! embedded LanceDB table. Changes reach the index through a single pipeline:
//! startup reconciliation, live filesystem events and directory registration
//! all feed one deduplicating queue, and one worker drains it. Search runs
//! alongside the worker.
//!
//! ## Architecture
//!
//! ```text
//!  reconcile ──┐
//!  watcher ────┼──► ChangeQueue ──► IndexingWorker ──► LanceStore
//!  add dir ────┘                        │                  ▲
//!                                   Embedder               │
//!                                                      search
//! ```
//!
//! ## Modules
//!
//! - [`service`]: The [`Semdex`] composition root and its operations
//! - [`content`]: Eligibility rules, file reading and directory scanning
//! - [`embedding`]: Embedding providers (Ollama, FastEmbed)
//! - [`vector_db`]: Document store and embedding-space governance
//! - [`queue`]: Path-deduplicating change queue
//! - [`worker`]: Queue-draining indexing worker
//! - [`reconcile`]: Disk-versus-index diffing at startup
//! - [`watcher`]: Debounced filesystem watcher
//! - [`registry`]: Persistent registry of watched directories
//! - [`lock`]: Single-writer lock
//! - [`config`]: Configuration with environment overrides
//! - [`types`]: Shared data types
//! - [`error`]: Error types
//! - [`paths`]: Platform paths and path-prefix helpers
//!
//! ## Usage Example
//!
//! ```no_run
//! use semdex::{Semdex, SearchOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = Semdex::new(None).await?;
//!     let hits = service.search("how do lifetimes work", SearchOptions::default()).await?;
//!     for hit in hits {
//!         println!("{:.3}  {}", hit.score, hit.path);
//!     }
//!     Ok(())
//! }
//! ```

/// Configuration management with environment variable overrides
pub mod config;

/// File eligibility, reading and scanning
pub mod content;

/// Embedding providers behind one trait
pub mod embedding;

/// Error types and utilities
pub mod error;

/// Cross-process single-writer lock
pub mod lock;

/// Platform paths and path-prefix helpers
pub mod paths;

pub mod queue;

/// Startup reconciliation between disk and index
pub mod reconcile;

/// Persistent registry of watched directories
pub mod registry;

pub mod service;

pub mod types;

/// Vector store abstraction and embedding-space governance
pub mod vector_db;

/// Debounced filesystem watcher
pub mod watcher;

pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{Result, SemdexError};
pub use service::Semdex;
pub use types::{
    AddDirectoryResult, ChangeReason, ChangeRecord, Directory, IndexingResult, SearchOptions,
    SearchResult, StatusReport,
};
