//! Service composition root
//!
//! [`Semdex`] owns every component (embedder, store, registry, queue,
//! worker) and exposes the operations the CLI and other front ends call.

use crate::config::Config;
use crate::content::ContentReader;
use crate::embedding::{EmbeddingProvider, create_provider};
use crate::error::{IndexingError, SemdexError, ValidationError};
use crate::lock::WriterLock;
use crate::paths;
use crate::queue::ChangeQueue;
use crate::reconcile::Reconciler;
use crate::registry::DirectoryRegistry;
use crate::types::{
    AddDirectoryResult, ChangeRecord, Directory, IndexingResult, SearchOptions, SearchResult,
    StatusReport,
};
use crate::vector_db::{
    LanceStore, SpaceDecision, SpaceStore, VectorStore, ensure_embedding_space,
};
use crate::watcher::{FsWatcher, spawn_forwarder};
use crate::worker::IndexingWorker;
use anyhow::Context;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Capacity of the channel between the watcher thread and the queue forwarder
const WATCH_CHANNEL_CAPACITY: usize = 1024;

/// Main service handle
///
/// Cheap to clone; every clone shares the same components and writer lock.
///
/// # Example
///
/// ```no_run
/// use semdex::{Config, Semdex, SearchOptions};
///
/// # async fn example() -> anyhow::Result<()> {
/// let service = Semdex::with_config(Config::default()).await?;
/// service.add_directory("/home/me/notes").await?;
///
/// let results = service
///     .search("borrow checker", SearchOptions::default())
///     .await?;
/// for r in results {
///     println!("{:.3} {}", r.score, r.path);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Semdex {
    config: Arc<Config>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    registry: DirectoryRegistry,
    reader: ContentReader,
    queue: Arc<ChangeQueue>,
    worker: Arc<IndexingWorker>,
    writer: Option<Arc<WriterLock>>,
    /// Set when the stored embedding space does not match this process's model
    space_mismatch: Option<String>,
    daemon_running: Arc<AtomicBool>,
}

impl Semdex {
    /// Load configuration from `config_path` (or the default location) and start
    pub async fn new(config_path: Option<&Path>) -> Result<Self, SemdexError> {
        let config = Config::new(config_path)?;
        Self::with_config(config).await
    }

    /// Start with the configured embedding provider
    pub async fn with_config(config: Config) -> Result<Self, SemdexError> {
        tracing::info!("Initializing semdex with configuration");
        tracing::debug!("Config: {:?}", config);

        let embedder = create_provider(&config.embedding)?;
        Self::with_provider(config, embedder).await
    }

    /// Start with an explicit embedding provider
    pub async fn with_provider(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, SemdexError> {
        // Without a reachable model there is no safe dimensionality decision
        let dimensions = embedder.test_connection().await?;
        tracing::info!(
            "Embedding provider ready: {} ({} dimensions)",
            embedder.model_name(),
            dimensions
        );

        let db_path = config.storage.lancedb_path.to_string_lossy().to_string();
        let store: Arc<dyn VectorStore> = Arc::new(
            LanceStore::open(&db_path)
                .await
                .context("Failed to open LanceDB")?,
        );

        let registry = DirectoryRegistry::new(&config.storage.registry_path);
        let spaces = SpaceStore::new(&config.storage.space_path);

        let writer = WriterLock::try_acquire(&config.storage.lock_path)?.map(Arc::new);
        let space_mismatch = match &writer {
            Some(_) => {
                let decision = ensure_embedding_space(
                    store.as_ref(),
                    &spaces,
                    &registry,
                    embedder.model_name(),
                    dimensions,
                )
                .await?;
                if decision != SpaceDecision::Unchanged {
                    tracing::info!("Embedding space decision: {:?}", decision);
                }
                None
            }
            None => {
                tracing::info!("Another process owns the index, running read-only");
                match spaces.load()? {
                    Some(space)
                        if space.model_name != embedder.model_name()
                            || space.dimensions != dimensions =>
                    {
                        Some(format!(
                            "index was built with '{}' ({} dimensions), configured model is '{}' ({} dimensions)",
                            space.model_name,
                            space.dimensions,
                            embedder.model_name(),
                            dimensions
                        ))
                    }
                    _ => None,
                }
            }
        };

        let reader = ContentReader::new(&config.indexing)?;
        let queue = Arc::new(ChangeQueue::new(reader.clone()));
        let worker = Arc::new(IndexingWorker::new(
            store.clone(),
            embedder.clone(),
            reader.clone(),
            registry.clone(),
            queue.clone(),
            Duration::from_millis(config.worker.idle_poll_ms),
        ));

        Ok(Self {
            config: Arc::new(config),
            embedder,
            store,
            registry,
            reader,
            queue,
            worker,
            writer,
            space_mismatch,
            daemon_running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// True when this process holds the writer lock
    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    fn ensure_writable(&self) -> Result<(), SemdexError> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(IndexingError::ReadOnly.into())
        }
    }

    /// Register a directory and hand its files to the indexing pipeline
    ///
    /// With a daemon running in this process the files are queued; when this
    /// process is the writer but no daemon runs they are indexed before
    /// returning; a read-only process only registers, and the daemon picks the
    /// directory up on its next registry sync.
    pub async fn add_directory(&self, path: &str) -> Result<AddDirectoryResult, SemdexError> {
        let root = paths::absolutize(path)
            .map_err(|e| ValidationError::InvalidPath(format!("{}: {}", path, e)))?;
        let meta = tokio::fs::metadata(&root)
            .await
            .map_err(|_| ValidationError::DirectoryNotFound(root.clone()))?;
        if !meta.is_dir() {
            return Err(ValidationError::NotADirectory(root).into());
        }

        let (directory, already_registered) = match self.registry.find_by_path(&root).await? {
            Some(existing) => {
                tracing::info!("Directory already registered, re-enqueueing: {}", root);
                (existing, true)
            }
            None => (self.registry.insert(Directory::new(&root)).await?, false),
        };

        let (queued_count, indexed) = if self.daemon_running.load(Ordering::SeqCst) {
            (self.queue.enqueue_directory(&root).await?, None)
        } else if self.is_writable() {
            let eligible = self.reader.scan_directory(&root).await?.len();
            (eligible, Some(self.worker.index_directory(&root).await?))
        } else {
            (self.reader.scan_directory(&root).await?.len(), None)
        };

        Ok(AddDirectoryResult {
            directory,
            queued_count,
            already_registered,
            indexed,
        })
    }

    /// Unregister a directory and delete every document under it
    ///
    /// Returns how many documents were removed. A read-only process leaves
    /// the cascade to the daemon's registry sync and returns 0.
    pub async fn remove_directory(&self, path: &str) -> Result<usize, SemdexError> {
        let root = paths::absolutize(path)
            .map_err(|e| ValidationError::InvalidPath(format!("{}: {}", path, e)))?;
        if self.registry.find_by_path(&root).await?.is_none() {
            return Err(ValidationError::DirectoryNotRegistered(root).into());
        }

        let removed = if self.is_writable() {
            let dropped = self.queue.remove_under(&root);
            if dropped > 0 {
                tracing::debug!("Dropped {} queued changes under {}", dropped, root);
            }
            self.store
                .delete_by_prefix(&root)
                .await
                .map_err(SemdexError::from_store)?
        } else {
            0
        };

        self.registry.delete(&root).await?;
        tracing::info!("Removed directory {} ({} documents)", root, removed);
        Ok(removed)
    }

    /// Registered directories with live document counts
    pub async fn list_directories(&self) -> Result<Vec<Directory>, SemdexError> {
        let mut directories = self.registry.find_all().await?;
        for dir in &mut directories {
            dir.file_count = self
                .store
                .count_by_prefix(&dir.path)
                .await
                .map_err(SemdexError::from_store)?;
        }
        Ok(directories)
    }

    /// Embed `query` and return the closest documents
    pub async fn search(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<SearchResult>, SemdexError> {
        if query.trim().is_empty() {
            return Err(ValidationError::ConstraintViolation {
                field: "query".to_string(),
                constraint: "non-empty".to_string(),
                actual: "empty string".to_string(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&options.min_score) {
            return Err(ValidationError::ConstraintViolation {
                field: "min_score".to_string(),
                constraint: "between 0.0 and 1.0".to_string(),
                actual: options.min_score.to_string(),
            }
            .into());
        }

        let vector = self.embedder.embed(query).await?;
        let prefix = options
            .path
            .as_deref()
            .map(paths::absolutize)
            .transpose()
            .map_err(|e| ValidationError::InvalidPath(e.to_string()))?;

        let results = self
            .search_vector(&vector, options.limit, prefix.as_deref())
            .await?;
        Ok(results
            .into_iter()
            .filter(|r| r.score >= options.min_score)
            .collect())
    }

    /// Nearest documents to a precomputed vector, optionally under `prefix`
    pub async fn search_vector(
        &self,
        vector: &[f32],
        k: usize,
        prefix: Option<&str>,
    ) -> Result<Vec<SearchResult>, SemdexError> {
        if k == 0 {
            return Err(ValidationError::ConstraintViolation {
                field: "limit".to_string(),
                constraint: "greater than 0".to_string(),
                actual: "0".to_string(),
            }
            .into());
        }
        if let Some(reason) = &self.space_mismatch {
            return Err(SemdexError::other(format!(
                "Cannot search, {}; restart the daemon to rebuild",
                reason
            )));
        }

        let Some(dimension) = self.store.dimension().await.map_err(SemdexError::from_store)?
        else {
            return Ok(Vec::new());
        };
        if vector.len() != dimension {
            return Err(crate::error::VectorDbError::DimensionMismatch {
                expected: dimension,
                actual: vector.len(),
            }
            .into());
        }

        let hits = self
            .store
            .find_similar(vector, k, prefix)
            .await
            .map_err(SemdexError::from_store)?;
        Ok(hits.into_iter().map(SearchResult::from).collect())
    }

    pub async fn status(&self) -> Result<StatusReport, SemdexError> {
        Ok(StatusReport {
            model_name: self.embedder.model_name().to_string(),
            dimensions: self.embedder.dimension(),
            documents: self.store.count().await.map_err(SemdexError::from_store)?,
            directories: self.registry.find_all().await?.len(),
            queue_size: self.queue.size(),
            writable: self.is_writable(),
        })
    }

    /// Drop every document; directories stay registered with zeroed stats
    pub async fn clear_index(&self) -> Result<(), SemdexError> {
        self.ensure_writable()?;
        self.queue.clear();
        self.store.clear().await.map_err(SemdexError::from_store)?;
        self.registry.reset_stats().await?;
        tracing::info!("Cleared index");
        Ok(())
    }

    pub async fn reindex_stale_files(&self) -> Result<IndexingResult, SemdexError> {
        self.ensure_writable()?;
        self.worker.reindex_stale_files().await
    }

    pub async fn index_file(&self, path: &str) -> Result<bool, SemdexError> {
        self.ensure_writable()?;
        self.worker.index_file(path).await
    }

    pub async fn index_directory(&self, path: &str) -> Result<IndexingResult, SemdexError> {
        self.ensure_writable()?;
        self.worker.index_directory(path).await
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), SemdexError> {
        self.ensure_writable()?;
        self.worker.remove_file(path).await
    }

    /// Bulk-enqueue every eligible file under `path`
    pub async fn enqueue_directory(&self, path: &str) -> Result<usize, SemdexError> {
        Ok(self.queue.enqueue_directory(path).await?)
    }

    pub fn enqueue_change(&self, change: ChangeRecord) {
        self.queue.enqueue(change);
    }

    pub fn poll_changes(&self, max: usize) -> Vec<ChangeRecord> {
        self.queue.poll(max)
    }

    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    /// Run the indexing daemon until `cancel` fires
    ///
    /// Reconciles registered roots against the index, watches them, drains
    /// the queue, and follows registry changes made by other processes.
    pub async fn run_daemon(&self, cancel: CancellationToken) -> Result<(), SemdexError> {
        self.ensure_writable()?;
        if self.daemon_running.swap(true, Ordering::SeqCst) {
            return Err(SemdexError::other("Daemon already running in this process"));
        }
        let _running = RunningGuard(self.daemon_running.clone());

        let roots: Vec<String> = self
            .registry
            .find_all()
            .await?
            .into_iter()
            .map(|d| d.path)
            .collect();

        let reconciler = Reconciler::new(self.reader.clone(), self.store.clone());
        let plan = reconciler.reconcile(&roots).await?;
        tracing::info!(
            "Startup reconciliation: {} new, {} modified, {} removed",
            plan.to_add.len(),
            plan.to_update.len(),
            plan.to_remove.len()
        );
        self.queue.seed(plan);

        let mut watcher = None;
        let mut forwarder = None;
        if self.config.watcher.enabled {
            let (tx, rx) = tokio::sync::mpsc::channel(WATCH_CHANNEL_CAPACITY);
            let mut fs_watcher = FsWatcher::new(
                self.reader.clone(),
                Duration::from_millis(self.config.watcher.debounce_ms),
                tx,
            )?;
            for root in &roots {
                if let Err(e) = fs_watcher.watch(Path::new(root)) {
                    tracing::warn!("Not watching {}: {}", root, e);
                }
            }
            forwarder = Some(spawn_forwarder(
                rx,
                self.queue.clone(),
                self.reader.clone(),
                self.store.clone(),
            ));
            watcher = Some(fs_watcher);
        }

        let drain = {
            let worker = self.worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { worker.drain_loop(cancel).await })
        };

        let mut known: HashSet<String> = roots.into_iter().collect();
        let mut ticker =
            tokio::time::interval(Duration::from_secs(self.config.worker.registry_sync_secs.max(1)));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_registry(&mut known, watcher.as_mut()).await {
                        tracing::warn!("Registry sync failed: {}", e);
                    }
                }
            }
        }

        tracing::info!("Shutting down daemon");
        if let Err(e) = drain.await {
            tracing::error!("Indexing worker task failed: {}", e);
        }
        // Dropping the watcher stops its thread, which closes the forwarder's channel
        drop(watcher);
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        Ok(())
    }

    /// Follow registrations made by other processes since the last sync
    async fn sync_registry(
        &self,
        known: &mut HashSet<String>,
        mut watcher: Option<&mut FsWatcher>,
    ) -> Result<(), SemdexError> {
        let current: HashSet<String> = self
            .registry
            .find_all()
            .await?
            .into_iter()
            .map(|d| d.path)
            .collect();

        for root in current.difference(known) {
            tracing::info!("New directory registered: {}", root);
            if let Some(w) = watcher.as_deref_mut()
                && let Err(e) = w.watch(Path::new(root))
            {
                tracing::warn!("Not watching {}: {}", root, e);
            }
            if let Err(e) = self.queue.enqueue_directory(root).await {
                tracing::warn!("Failed to enqueue {}: {:#}", root, e);
            }
        }

        for root in known.difference(&current) {
            tracing::info!("Directory unregistered: {}", root);
            if let Some(w) = watcher.as_deref_mut()
                && let Err(e) = w.unwatch(Path::new(root))
            {
                tracing::debug!("Unwatch {}: {}", root, e);
            }
            self.queue.remove_under(root);
            self.store
                .delete_by_prefix(root)
                .await
                .map_err(SemdexError::from_store)?;
        }

        *known = current;
        Ok(())
    }
}

/// Clears the in-process daemon flag however `run_daemon` exits
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
