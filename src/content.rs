//! File eligibility rules, file reading and directory scanning

use crate::config::IndexingConfig;
use crate::types::{from_millis, to_millis};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::Path;
use std::sync::Arc;

/// Text and metadata of an eligible file
#[derive(Debug, Clone)]
pub struct FileContent {
    pub content: String,
    pub path: String,
    /// Truncated to millisecond precision
    pub modified_at: DateTime<Utc>,
    pub size: u64,
}

/// An eligible file found while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub modified_at: DateTime<Utc>,
}

/// Reads files and lists directories under the configured eligibility rules
#[derive(Clone)]
pub struct ContentReader {
    extensions: Arc<Vec<String>>,
    ignore: GlobSet,
    max_file_size: u64,
}

impl ContentReader {
    pub fn new(config: &IndexingConfig) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &config.ignore_patterns {
            // A bare pattern matches anywhere in the path and everything below it
            let trimmed = pattern.trim_matches('/');
            for expanded in [format!("**/{}", trimmed), format!("**/{}/**", trimmed)] {
                let glob = Glob::new(&expanded)
                    .with_context(|| format!("Invalid ignore pattern '{}'", pattern))?;
                builder.add(glob);
            }
        }
        let ignore = builder.build().context("Failed to compile ignore patterns")?;

        Ok(Self {
            extensions: Arc::new(
                config
                    .extensions
                    .iter()
                    .map(|ext| ext.to_lowercase())
                    .collect(),
            ),
            ignore,
            max_file_size: config.max_file_size,
        })
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Read a file if it is eligible. Anything else yields `None`.
    pub async fn read(&self, path: &str) -> Option<FileContent> {
        if !self.is_supported(Path::new(path)) {
            return None;
        }

        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("Cannot stat {}: {}", path, e);
                return None;
            }
        };

        if !metadata.is_file() {
            return None;
        }

        if metadata.len() > self.max_file_size {
            tracing::warn!(
                "File too large, skipping: {} ({} bytes > {})",
                path,
                metadata.len(),
                self.max_file_size
            );
            return None;
        }

        let modified_at = match metadata.modified() {
            Ok(t) => truncate_to_millis(t.into()),
            Err(e) => {
                tracing::debug!("No modification time for {}: {}", path, e);
                return None;
            }
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) => Some(FileContent {
                content,
                path: path.to_string(),
                modified_at,
                size: metadata.len(),
            }),
            Err(e) => {
                tracing::warn!("Failed to read file {}: {}", path, e);
                None
            }
        }
    }

    /// Current modification time of a file, millisecond precision
    pub async fn modified_time(&self, path: &str) -> Option<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        metadata
            .modified()
            .ok()
            .map(|t| truncate_to_millis(t.into()))
    }

    /// Extension is in the allow-list and no ignore pattern matches
    pub fn is_supported(&self, path: &Path) -> bool {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!(".{}", ext.to_lowercase()),
            None => return false,
        };

        self.extensions.contains(&ext) && !self.should_ignore(path)
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        self.ignore.is_match(path)
    }

    /// Recursively list eligible files under `root`, sorted by path
    pub async fn scan_directory(&self, root: &str) -> Result<Vec<String>> {
        Ok(self
            .scan_entries(root)
            .await?
            .into_iter()
            .map(|entry| entry.path)
            .collect())
    }

    /// Like [`scan_directory`](Self::scan_directory) but keeps each file's mtime
    pub async fn scan_entries(&self, root: &str) -> Result<Vec<FileEntry>> {
        let reader = self.clone();
        let root = root.to_string();
        tokio::task::spawn_blocking(move || reader.walk(&root))
            .await
            .context("Directory scan task panicked")?
    }

    fn walk(&self, root: &str) -> Result<Vec<FileEntry>> {
        let root_path = Path::new(root);
        if !root_path.is_dir() {
            anyhow::bail!("Not a directory: {}", root);
        }

        let ignore = self.ignore.clone();
        let walker = WalkBuilder::new(root_path)
            .standard_filters(false)
            .follow_links(false)
            .filter_entry(move |entry| !ignore.is_match(entry.path()))
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry under {}: {}", root, e);
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }

            let path = entry.path();
            if !self.is_supported(path) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    tracing::debug!("Cannot stat {:?}: {}", path, e);
                    continue;
                }
            };

            if metadata.len() > self.max_file_size {
                tracing::debug!("Skipping large file: {:?}", path);
                continue;
            }

            let Ok(modified) = metadata.modified() else {
                continue;
            };

            files.push(FileEntry {
                path: path.to_string_lossy().to_string(),
                modified_at: truncate_to_millis(modified.into()),
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!("Found {} eligible files under {}", files.len(), root);
        Ok(files)
    }
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    from_millis(to_millis(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn reader() -> ContentReader {
        ContentReader::new(&IndexingConfig::default()).unwrap()
    }

    #[test]
    fn test_is_supported_by_extension() {
        let reader = reader();
        assert!(reader.is_supported(Path::new("/docs/a.md")));
        assert!(reader.is_supported(Path::new("/docs/A.MD")));
        assert!(reader.is_supported(Path::new("/docs/notes.txt")));
        assert!(!reader.is_supported(Path::new("/docs/main.rs")));
        assert!(!reader.is_supported(Path::new("/docs/README")));
    }

    #[test]
    fn test_should_ignore_any_component() {
        let reader = reader();
        assert!(reader.should_ignore(Path::new("/p/node_modules/pkg/readme.md")));
        assert!(reader.should_ignore(Path::new("/p/.git/HEAD")));
        assert!(reader.should_ignore(Path::new("/p/dist/app.min.js")));
        assert!(!reader.should_ignore(Path::new("/p/docs/readme.md")));
        assert!(!reader.is_supported(Path::new("/p/node_modules/readme.md")));
    }

    #[tokio::test]
    async fn test_read_eligible_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.md");
        fs::write(&path, "# Title\nbody").unwrap();

        let content = reader().read(path.to_str().unwrap()).await.unwrap();
        assert_eq!(content.content, "# Title\nbody");
        assert_eq!(content.size, 12);
        assert_eq!(content.modified_at.timestamp_subsec_nanos() % 1_000_000, 0);
    }

    #[tokio::test]
    async fn test_read_rejects_oversize_and_unsupported() {
        let dir = TempDir::new().unwrap();
        let big = dir.path().join("big.md");
        fs::write(&big, "x".repeat(200)).unwrap();
        let code = dir.path().join("main.rs");
        fs::write(&code, "fn main() {}").unwrap();

        let config = IndexingConfig {
            max_file_size: 100,
            ..Default::default()
        };
        let reader = ContentReader::new(&config).unwrap();

        assert!(reader.read(big.to_str().unwrap()).await.is_none());
        assert!(reader.read(code.to_str().unwrap()).await.is_none());
        assert!(reader.read("/nonexistent/file.md").await.is_none());
    }

    #[tokio::test]
    async fn test_read_rejects_non_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bin.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x81]).unwrap();

        assert!(reader().read(path.to_str().unwrap()).await.is_none());
    }

    #[tokio::test]
    async fn test_scan_prunes_ignored_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("a.md"), "a").unwrap();
        fs::write(root.join("sub/b.txt"), "b").unwrap();
        fs::write(root.join("sub/c.rs"), "c").unwrap();
        fs::write(root.join("node_modules/pkg/readme.md"), "ignored").unwrap();

        let files = reader()
            .scan_directory(root.to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.md"));
        assert!(files[1].ends_with("b.txt"));
    }

    #[tokio::test]
    async fn test_scan_skips_oversize_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("small.md"), "ok").unwrap();
        fs::write(dir.path().join("large.md"), "x".repeat(500)).unwrap();

        let config = IndexingConfig {
            max_file_size: 100,
            ..Default::default()
        };
        let files = ContentReader::new(&config)
            .unwrap()
            .scan_entries(dir.path().to_str().unwrap())
            .await
            .unwrap();

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("small.md"));
    }

    #[tokio::test]
    async fn test_scan_missing_root_fails() {
        assert!(reader().scan_directory("/nonexistent/root").await.is_err());
    }
}
