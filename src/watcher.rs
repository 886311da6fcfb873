//! Filesystem watcher publishing change records onto the queue
//!
//! Directories moved into or out of a watched root arrive as a single event
//! for the directory itself. Those are forwarded as [`WatchEvent`] directory
//! variants and expanded against the disk or the index.

use crate::content::ContentReader;
use crate::error::IndexingError;
use crate::paths;
use crate::queue::ChangeQueue;
use crate::types::{ChangeReason, ChangeRecord};
use crate::vector_db::VectorStore;
use notify_debouncer_full::notify::event::{ModifyKind, RemoveKind, RenameMode};
use notify_debouncer_full::notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{
    DebounceEventResult, DebouncedEvent, Debouncer, RecommendedCache, new_debouncer,
};
use std::path::Path;
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

/// One converted filesystem event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// An eligible file changed
    File(ChangeRecord),
    /// A directory appeared, possibly with files already inside
    DirectoryAdded(String),
    /// A directory disappeared along with everything below it
    DirectoryRemoved(String),
}

/// Debounced recursive watcher over registered roots
pub struct FsWatcher {
    debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FsWatcher {
    /// Start the debouncer; converted events are sent on `event_tx`
    pub fn new(
        reader: ContentReader,
        debounce: Duration,
        event_tx: tokio_mpsc::Sender<WatchEvent>,
    ) -> Result<Self, IndexingError> {
        let (tx, rx) = mpsc::channel::<DebounceEventResult>();

        std::thread::spawn(move || {
            while let Ok(result) = rx.recv() {
                if !handle_debounced_events(result, &reader, &event_tx) {
                    tracing::debug!("Change channel closed, stopping watcher thread");
                    break;
                }
            }
        });

        let debouncer = new_debouncer(debounce, None, move |result| {
            let _ = tx.send(result);
        })
        .map_err(|e| IndexingError::WatcherFailed(e.to_string()))?;

        Ok(Self { debouncer })
    }

    pub fn watch(&mut self, root: &Path) -> Result<(), IndexingError> {
        tracing::debug!("Starting to watch: {:?}", root);
        self.debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| IndexingError::WatcherFailed(format!("{}: {}", root.display(), e)))
    }

    pub fn unwatch(&mut self, root: &Path) -> Result<(), IndexingError> {
        tracing::debug!("Stopping watch: {:?}", root);
        self.debouncer
            .unwatch(root)
            .map_err(|e| IndexingError::WatcherFailed(format!("{}: {}", root.display(), e)))
    }
}

/// Returns false once the receiving side is gone
fn handle_debounced_events(
    result: DebounceEventResult,
    reader: &ContentReader,
    event_tx: &tokio_mpsc::Sender<WatchEvent>,
) -> bool {
    match result {
        Ok(events) => {
            for event in events {
                for converted in convert_event(&event, reader) {
                    // Blocking send since we're on a std thread
                    if event_tx.blocking_send(converted).is_err() {
                        return false;
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                tracing::error!("Watch error: {}", error);
            }
        }
    }
    true
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Something appeared at `path`
fn added(path: &Path, reader: &ContentReader) -> Option<WatchEvent> {
    if path.is_dir() {
        return (!reader.should_ignore(path))
            .then(|| WatchEvent::DirectoryAdded(path_string(path)));
    }
    reader
        .is_supported(path)
        .then(|| WatchEvent::File(ChangeRecord::new(path_string(path), None)))
}

/// Something disappeared from `path`; it can no longer be inspected
fn removed(path: &Path, folder: bool, reader: &ContentReader) -> Option<WatchEvent> {
    if !folder && reader.is_supported(path) {
        return Some(WatchEvent::File(ChangeRecord::deleted(path_string(path))));
    }
    // Without a kind hint, only extensionless names are taken as directories
    let directory = folder || path.extension().is_none();
    (directory && !reader.should_ignore(path))
        .then(|| WatchEvent::DirectoryRemoved(path_string(path)))
}

fn modified(path: &Path, reader: &ContentReader) -> Option<WatchEvent> {
    reader
        .is_supported(path)
        .then(|| WatchEvent::File(ChangeRecord::modified(path_string(path), None)))
}

fn convert_event(event: &DebouncedEvent, reader: &ContentReader) -> Vec<WatchEvent> {
    let paths = &event.paths;

    let converted: Vec<Option<WatchEvent>> = match &event.kind {
        EventKind::Create(_) => paths.iter().map(|p| added(p, reader)).collect(),
        EventKind::Remove(kind) => {
            let folder = matches!(kind, RemoveKind::Folder);
            paths.iter().map(|p| removed(p, folder, reader)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() >= 2 => vec![
            removed(&paths[0], false, reader),
            added(&paths[1], reader),
        ],
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.iter().map(|p| removed(p, false, reader)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            paths.iter().map(|p| added(p, reader)).collect()
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|p| {
                if p.exists() {
                    added(p, reader)
                } else {
                    removed(p, false, reader)
                }
            })
            .collect(),
        EventKind::Modify(_) => paths.iter().map(|p| modified(p, reader)).collect(),
        _ => Vec::new(),
    };

    converted.into_iter().flatten().collect()
}

/// Move watcher output onto the queue
///
/// File changes get their mtime stamped. Added directories are scanned and
/// removed directories expand to deletes for every indexed file below them.
pub fn spawn_forwarder(
    mut event_rx: tokio_mpsc::Receiver<WatchEvent>,
    queue: Arc<ChangeQueue>,
    reader: ContentReader,
    store: Arc<dyn VectorStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event {
                WatchEvent::File(mut change) => {
                    if change.reason != ChangeReason::Deleted {
                        change.mtime = reader.modified_time(&change.path).await;
                    }
                    queue.enqueue(change);
                }
                WatchEvent::DirectoryAdded(dir) => {
                    if let Err(e) = queue.enqueue_directory(&dir).await {
                        tracing::warn!("Failed to scan added directory {}: {}", dir, e);
                    }
                }
                WatchEvent::DirectoryRemoved(dir) => match store.indexed_timestamps().await {
                    Ok(indexed) => {
                        let count = queue.enqueue_all(
                            indexed
                                .into_keys()
                                .filter(|path| paths::is_under(path, &dir))
                                .map(ChangeRecord::deleted),
                        );
                        if count > 0 {
                            tracing::info!(
                                "Enqueued {} deletions from removed directory: {}",
                                count,
                                dir
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to expand removed directory {}: {}", dir, e);
                    }
                },
            }
        }
        tracing::debug!("Watcher forwarder stopped");
    })
}
