//! Single-consumer indexing worker
//!
//! Drains the change queue one record at a time: read, embed, store, or
//! delete. One bad file never stalls the loop.

use crate::content::ContentReader;
use crate::embedding::EmbeddingProvider;
use crate::error::{IndexingError, SemdexError};
use crate::queue::ChangeQueue;
use crate::registry::DirectoryRegistry;
use crate::types::{ChangeReason, ChangeRecord, IndexedDocument, IndexingResult};
use crate::vector_db::VectorStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct IndexingWorker {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    reader: ContentReader,
    registry: DirectoryRegistry,
    queue: Arc<ChangeQueue>,
    idle_poll: Duration,
}

impl IndexingWorker {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        reader: ContentReader,
        registry: DirectoryRegistry,
        queue: Arc<ChangeQueue>,
        idle_poll: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            reader,
            registry,
            queue,
            idle_poll,
        }
    }

    /// Index one file. Returns true iff a write happened.
    ///
    /// Ineligible, up-to-date and too-long files are skips (`Ok(false)`);
    /// other embedding failures and store failures are errors.
    pub async fn index_file(&self, path: &str) -> Result<bool, SemdexError> {
        let Some(file) = self.reader.read(path).await else {
            tracing::debug!("Skipped file (not readable or not supported): {}", path);
            return Ok(false);
        };

        let existing = self
            .store
            .find_by_path(path)
            .await
            .map_err(SemdexError::from_store)?;
        if let Some(existing) = &existing
            && existing.file_modified_at >= file.modified_at
        {
            tracing::debug!("File already up to date: {}", path);
            return Ok(false);
        }

        let embedding = match self.embedder.embed(&file.content).await {
            Ok(embedding) => embedding,
            Err(e) if e.is_skippable() => {
                tracing::warn!("File too long for embedding model, skipping: {}", path);
                return Ok(false);
            }
            Err(e) => {
                tracing::error!("Failed to embed {}: {}", path, e);
                return Err(e.into());
            }
        };

        let mut doc =
            IndexedDocument::new(path, file.content, embedding, file.modified_at, file.size);

        let written = match existing {
            Some(existing) => {
                doc.id = existing.id;
                self.store.update(&doc).await
            }
            None => self.store.insert(&doc).await,
        };
        written.map_err(SemdexError::from_store)?;

        tracing::info!("Indexed: {}", path);
        Ok(true)
    }

    /// Index every eligible file under `root`, then refresh the root's registry stats
    pub async fn index_directory(&self, root: &str) -> Result<IndexingResult, SemdexError> {
        tracing::info!("Starting indexing: {}", root);

        let files = self
            .reader
            .scan_directory(root)
            .await
            .map_err(|e| IndexingError::ScanFailed {
                dir: root.to_string(),
                reason: format!("{:#}", e),
            })?;
        tracing::info!("Found {} files to index", files.len());

        let mut result = IndexingResult::default();
        for file in &files {
            match self.index_file(file).await {
                Ok(true) => result.indexed += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    tracing::warn!("Failed to index {}: {}", file, e);
                    result.errors += 1;
                }
            }
            tokio::task::yield_now().await;
        }

        let file_count = self
            .store
            .count_by_prefix(root)
            .await
            .map_err(SemdexError::from_store)?;
        self.registry.update_file_count(root, file_count).await?;
        self.registry.update_last_indexed_at(root, Utc::now()).await?;

        tracing::info!(
            "Indexing complete: {} indexed, {} skipped, {} errors",
            result.indexed,
            result.skipped,
            result.errors
        );
        Ok(result)
    }

    /// Drop a file from the index; unknown paths are a no-op
    pub async fn remove_file(&self, path: &str) -> Result<(), SemdexError> {
        let removed = self
            .store
            .delete(path)
            .await
            .map_err(SemdexError::from_store)?;
        if removed {
            tracing::info!("Removed from index: {}", path);
        }
        Ok(())
    }

    /// `index_directory` over every registered root
    pub async fn reindex_stale_files(&self) -> Result<IndexingResult, SemdexError> {
        let mut total = IndexingResult::default();
        for dir in self.registry.find_all().await? {
            match self.index_directory(&dir.path).await {
                Ok(result) => total += result,
                Err(e) => {
                    tracing::warn!("Failed to reindex {}: {}", dir.path, e);
                    total.errors += 1;
                }
            }
        }
        Ok(total)
    }

    /// Apply one queued change, logging rather than returning failures
    pub async fn process(&self, change: ChangeRecord) {
        let outcome = match change.reason {
            ChangeReason::Deleted => self.remove_file(&change.path).await,
            ChangeReason::New | ChangeReason::Modified => {
                self.index_file(&change.path).await.map(|_| ())
            }
        };

        if let Err(e) = outcome {
            // Not re-queued; the next reconciliation or event for the path retries it
            tracing::error!("Failed to process {} ({}): {}", change.path, change.reason, e);
        }
    }

    /// Drain the queue until `cancel` fires. An in-flight item always completes.
    pub async fn drain_loop(&self, cancel: CancellationToken) {
        tracing::info!("Indexing worker started");

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.queue.poll_one() {
                Some(change) => {
                    self.process(change).await;
                    tokio::task::yield_now().await;
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = self.queue.wait_for_work() => {}
                        _ = tokio::time::sleep(self.idle_poll) => {}
                    }
                }
            }
        }

        tracing::info!(
            "Indexing worker stopped with {} changes still queued",
            self.queue.size()
        );
    }
}
