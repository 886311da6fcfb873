//! Path-deduplicating change queue
//!
//! Records are ordered by the sequence number of their latest enqueue, so a
//! re-queued path moves behind everything queued before it while keeping
//! only its newest intent.

use crate::content::ContentReader;
use crate::reconcile::SyncPlan;
use crate::types::ChangeRecord;
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;

#[derive(Default)]
struct QueueState {
    next_seq: u64,
    /// path -> sequence of its live record
    index: HashMap<String, u64>,
    /// sequence -> record, oldest first
    order: BTreeMap<u64, ChangeRecord>,
}

impl QueueState {
    fn push(&mut self, change: ChangeRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some(old) = self.index.insert(change.path.clone(), seq) {
            self.order.remove(&old);
        }
        self.order.insert(seq, change);
    }

    fn pop(&mut self) -> Option<ChangeRecord> {
        let (_, change) = self.order.pop_first()?;
        self.index.remove(&change.path);
        Some(change)
    }
}

pub struct ChangeQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    reader: ContentReader,
}

impl ChangeQueue {
    pub fn new(reader: ContentReader) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            reader,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue one change, replacing any record already queued for its path
    pub fn enqueue(&self, change: ChangeRecord) {
        tracing::debug!("Enqueued: {} ({})", change.path, change.reason);
        self.lock().push(change);
        self.notify.notify_one();
    }

    /// Queue several changes under one lock
    pub fn enqueue_all(&self, changes: impl IntoIterator<Item = ChangeRecord>) -> usize {
        let mut count = 0;
        {
            let mut state = self.lock();
            for change in changes {
                state.push(change);
                count += 1;
            }
        }
        if count > 0 {
            self.notify.notify_one();
        }
        count
    }

    /// Queue every eligible file under `root` as new
    pub async fn enqueue_directory(&self, root: &str) -> Result<usize> {
        let entries = self.reader.scan_entries(root).await?;
        let count = self.enqueue_all(
            entries
                .into_iter()
                .map(|e| ChangeRecord::new(e.path, Some(e.modified_at))),
        );
        tracing::info!("Enqueued {} files from directory: {}", count, root);
        Ok(count)
    }

    /// Queue the outcome of a reconciliation, merging with anything already queued
    pub fn seed(&self, plan: SyncPlan) -> usize {
        let SyncPlan {
            to_add,
            to_update,
            to_remove,
        } = plan;

        let changes = to_add
            .into_iter()
            .map(|e| ChangeRecord::new(e.path, Some(e.modified_at)))
            .chain(
                to_update
                    .into_iter()
                    .map(|e| ChangeRecord::modified(e.path, Some(e.modified_at))),
            )
            .chain(to_remove.into_iter().map(ChangeRecord::deleted));

        self.enqueue_all(changes)
    }

    /// Remove and return up to `max` of the oldest records
    pub fn poll(&self, max: usize) -> Vec<ChangeRecord> {
        let mut state = self.lock();
        let mut out = Vec::with_capacity(max.min(state.order.len()));
        while out.len() < max {
            match state.pop() {
                Some(change) => out.push(change),
                None => break,
            }
        }
        out
    }

    pub fn poll_one(&self) -> Option<ChangeRecord> {
        self.lock().pop()
    }

    pub fn size(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Drop every queued record under `root`, returning how many were dropped
    pub fn remove_under(&self, root: &str) -> usize {
        let mut state = self.lock();
        let doomed: Vec<(String, u64)> = state
            .index
            .iter()
            .filter(|(path, _)| crate::paths::is_under(path, root))
            .map(|(path, seq)| (path.clone(), *seq))
            .collect();
        for (path, seq) in &doomed {
            state.index.remove(path);
            state.order.remove(seq);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.index.clear();
        state.order.clear();
    }

    /// Resolves once something has been enqueued since the last wakeup
    pub async fn wait_for_work(&self) {
        self.notify.notified().await;
    }
}
