//! Diff the filesystem against the index for a set of roots

use crate::content::{ContentReader, FileEntry};
use crate::vector_db::VectorStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Classification of every path touched by reconciliation.
///
/// A path lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// On disk, not indexed
    pub to_add: Vec<FileEntry>,
    /// On disk and indexed, but newer on disk
    pub to_update: Vec<FileEntry>,
    /// Indexed, but no longer an eligible file under any root
    pub to_remove: Vec<String>,
}

impl SyncPlan {
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pure diff of `current` (path -> mtime on disk) against `indexed` (path -> stored mtime)
pub fn diff(
    current: &HashMap<String, DateTime<Utc>>,
    indexed: &HashMap<String, DateTime<Utc>>,
) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for (path, stored) in indexed {
        match current.get(path) {
            None => plan.to_remove.push(path.clone()),
            Some(mtime) if mtime > stored => plan.to_update.push(FileEntry {
                path: path.clone(),
                modified_at: *mtime,
            }),
            Some(_) => {}
        }
    }

    for (path, mtime) in current {
        if !indexed.contains_key(path) {
            plan.to_add.push(FileEntry {
                path: path.clone(),
                modified_at: *mtime,
            });
        }
    }

    plan.to_add.sort_by(|a, b| a.path.cmp(&b.path));
    plan.to_update.sort_by(|a, b| a.path.cmp(&b.path));
    plan.to_remove.sort();
    plan
}

pub struct Reconciler {
    reader: ContentReader,
    store: Arc<dyn VectorStore>,
}

impl Reconciler {
    pub fn new(reader: ContentReader, store: Arc<dyn VectorStore>) -> Self {
        Self { reader, store }
    }

    /// Classify every eligible file under `roots` and every indexed document
    pub async fn reconcile(&self, roots: &[String]) -> Result<SyncPlan> {
        let mut current = HashMap::new();
        for root in roots {
            match self.reader.scan_entries(root).await {
                Ok(entries) => {
                    current.extend(entries.into_iter().map(|e| (e.path, e.modified_at)));
                }
                // Its documents fall out as removals
                Err(e) => tracing::warn!("Failed to scan {}: {:#}", root, e),
            }
        }

        let indexed = self.store.indexed_timestamps().await?;
        let plan = diff(&current, &indexed);

        tracing::info!(
            "Reconciled {} roots: {} to add, {} to update, {} to remove",
            roots.len(),
            plan.to_add.len(),
            plan.to_update.len(),
            plan.to_remove.len()
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;
    use crate::types::{IndexedDocument, from_millis};
    use crate::vector_db::LanceStore;
    use filetime::FileTime;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn map(entries: &[(&str, i64)]) -> HashMap<String, DateTime<Utc>> {
        entries
            .iter()
            .map(|(p, ms)| (p.to_string(), from_millis(*ms)))
            .collect()
    }

    #[test]
    fn test_diff_classifies() {
        let current = map(&[("/d/a.md", 2_000), ("/d/b.md", 1_000), ("/d/new.md", 500)]);
        let indexed = map(&[("/d/a.md", 1_000), ("/d/b.md", 1_000), ("/d/gone.md", 1_000)]);

        let plan = diff(&current, &indexed);

        assert_eq!(plan.to_add.len(), 1);
        assert_eq!(plan.to_add[0].path, "/d/new.md");
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].path, "/d/a.md");
        assert_eq!(plan.to_update[0].modified_at, from_millis(2_000));
        assert_eq!(plan.to_remove, vec!["/d/gone.md".to_string()]);
    }

    #[test]
    fn test_diff_older_on_disk_is_not_update() {
        let plan = diff(&map(&[("/a.md", 500)]), &map(&[("/a.md", 1_000)]));
        assert!(plan.is_empty());
    }

    #[test]
    fn test_diff_partition_is_exclusive() {
        let current = map(&[("/1", 1), ("/2", 5), ("/3", 3), ("/5", 9)]);
        let indexed = map(&[("/2", 1), ("/3", 3), ("/4", 1), ("/5", 10)]);
        let plan = diff(&current, &indexed);

        let mut seen = HashSet::new();
        let all = plan
            .to_add
            .iter()
            .map(|e| e.path.clone())
            .chain(plan.to_update.iter().map(|e| e.path.clone()))
            .chain(plan.to_remove.iter().cloned());
        for path in all {
            assert!(seen.insert(path.clone()), "{} classified twice", path);
        }
        assert_eq!(seen.len(), 3);
        assert!(seen.contains("/1"));
        assert!(seen.contains("/2"));
        assert!(seen.contains("/4"));
    }

    #[tokio::test]
    async fn test_reconcile_detects_modified_file() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("docs");
        fs::create_dir_all(&root).unwrap();
        let a = root.join("a.md");
        let b = root.join("b.md");
        fs::write(&a, "alpha").unwrap();
        fs::write(&b, "beta").unwrap();

        let t1 = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_mtime(&a, t1).unwrap();
        filetime::set_file_mtime(&b, t1).unwrap();

        let store = LanceStore::open(temp.path().join("lancedb").to_str().unwrap())
            .await
            .unwrap();
        store.initialize(2).await.unwrap();
        for path in [&a, &b] {
            store
                .insert(&IndexedDocument::new(
                    path.to_str().unwrap(),
                    "x",
                    vec![0.0, 1.0],
                    from_millis(1_700_000_000_000),
                    5,
                ))
                .await
                .unwrap();
        }

        let t2 = FileTime::from_unix_time(1_700_000_100, 0);
        filetime::set_file_mtime(&a, t2).unwrap();

        let reader = ContentReader::new(&IndexingConfig::default()).unwrap();
        let reconciler = Reconciler::new(reader, Arc::new(store));
        let plan = reconciler
            .reconcile(&[root.to_str().unwrap().to_string()])
            .await
            .unwrap();

        assert!(plan.to_add.is_empty());
        assert!(plan.to_remove.is_empty());
        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].path, a.to_str().unwrap());
    }

    #[tokio::test]
    async fn test_reconcile_dropped_root_removes_documents() {
        let temp = TempDir::new().unwrap();
        let store = LanceStore::open(temp.path().join("lancedb").to_str().unwrap())
            .await
            .unwrap();
        store.initialize(2).await.unwrap();
        store
            .insert(&IndexedDocument::new(
                "/unregistered/a.md",
                "x",
                vec![0.0, 1.0],
                Utc::now(),
                1,
            ))
            .await
            .unwrap();

        let reader = ContentReader::new(&IndexingConfig::default()).unwrap();
        let plan = Reconciler::new(reader, Arc::new(store))
            .reconcile(&[])
            .await
            .unwrap();

        assert_eq!(plan.to_remove, vec!["/unregistered/a.md".to_string()]);
    }
}
