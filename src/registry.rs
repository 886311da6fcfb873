//! Registered root directories, persisted as a JSON file
//!
//! Every operation is a load-modify-save cycle under an exclusive flock on a
//! sidecar lock file, so a running daemon and one-shot CLI invocations can
//! share the registry.

use crate::error::{RegistryError, SemdexError};
use crate::types::Directory;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    directories: Vec<Directory>,
}

/// Handle to the on-disk directory registry
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    path: PathBuf,
    lock_path: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path.file_name().unwrap_or_default().to_os_string();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a directory. Fails if the path is already present.
    pub async fn insert(&self, directory: Directory) -> Result<Directory, SemdexError> {
        self.transact(move |file| {
            if file.directories.iter().any(|d| d.path == directory.path) {
                return Err(RegistryError::AlreadyRegistered(directory.path.clone()));
            }
            file.directories.push(directory.clone());
            Ok((true, directory))
        })
        .await
    }

    /// Unregister a directory. Returns false if it was not registered.
    pub async fn delete(&self, path: &str) -> Result<bool, SemdexError> {
        let path = path.to_string();
        self.transact(move |file| {
            let before = file.directories.len();
            file.directories.retain(|d| d.path != path);
            let removed = file.directories.len() != before;
            Ok((removed, removed))
        })
        .await
    }

    pub async fn find_by_path(&self, path: &str) -> Result<Option<Directory>, SemdexError> {
        let path = path.to_string();
        self.transact(move |file| {
            Ok((
                false,
                file.directories.iter().find(|d| d.path == path).cloned(),
            ))
        })
        .await
    }

    /// All registered directories, newest first
    pub async fn find_all(&self) -> Result<Vec<Directory>, SemdexError> {
        self.transact(|file| {
            let mut dirs = file.directories.clone();
            dirs.sort_by(|a, b| b.added_at.cmp(&a.added_at));
            Ok((false, dirs))
        })
        .await
    }

    pub async fn update_file_count(&self, path: &str, count: usize) -> Result<(), SemdexError> {
        let path = path.to_string();
        self.transact(move |file| {
            let dir = file.directories.iter_mut().find(|d| d.path == path);
            let found = dir.is_some();
            if let Some(dir) = dir {
                dir.file_count = count;
            }
            Ok((found, ()))
        })
        .await
    }

    pub async fn update_last_indexed_at(
        &self,
        path: &str,
        at: DateTime<Utc>,
    ) -> Result<(), SemdexError> {
        let path = path.to_string();
        self.transact(move |file| {
            let dir = file.directories.iter_mut().find(|d| d.path == path);
            let found = dir.is_some();
            if let Some(dir) = dir {
                dir.last_indexed_at = Some(at);
            }
            Ok((found, ()))
        })
        .await
    }

    /// Zero every directory's stats, keeping the registrations
    pub async fn reset_stats(&self) -> Result<(), SemdexError> {
        self.transact(|file| {
            for dir in &mut file.directories {
                dir.file_count = 0;
                dir.last_indexed_at = None;
            }
            Ok((!file.directories.is_empty(), ()))
        })
        .await
    }

    /// Run `op` on the loaded registry under the file lock.
    ///
    /// `op` returns whether it modified the registry along with its result;
    /// the file is rewritten only when it did.
    async fn transact<T, F>(&self, op: F) -> Result<T, SemdexError>
    where
        T: Send + 'static,
        F: FnOnce(&mut RegistryFile) -> Result<(bool, T), RegistryError> + Send + 'static,
    {
        let registry = self.clone();
        let result = tokio::task::spawn_blocking(move || registry.transact_blocking(op))
            .await
            .map_err(|e| SemdexError::other(format!("Registry task failed: {}", e)))?;
        Ok(result?)
    }

    fn transact_blocking<T, F>(&self, op: F) -> Result<T, RegistryError>
    where
        F: FnOnce(&mut RegistryFile) -> Result<(bool, T), RegistryError>,
    {
        let _lock = self.lock()?;
        let mut file = self.load()?;
        let (dirty, value) = op(&mut file)?;
        if dirty {
            self.save(&file)?;
        }
        Ok(value)
    }

    fn lock(&self) -> Result<File, RegistryError> {
        let lock_err = |reason: String| RegistryError::LockFailed {
            path: self.lock_path.display().to_string(),
            reason,
        };

        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| lock_err(e.to_string()))?;
        }
        let file = File::create(&self.lock_path).map_err(|e| lock_err(e.to_string()))?;
        file.lock_exclusive().map_err(|e| lock_err(e.to_string()))?;
        Ok(file)
    }

    fn load(&self) -> Result<RegistryFile, RegistryError> {
        if !self.path.exists() {
            return Ok(RegistryFile::default());
        }

        let load_err = |reason: String| RegistryError::LoadFailed {
            path: self.path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(&self.path).map_err(|e| load_err(e.to_string()))?;
        if content.trim().is_empty() {
            return Ok(RegistryFile::default());
        }
        serde_json::from_str(&content).map_err(|e| load_err(e.to_string()))
    }

    fn save(&self, file: &RegistryFile) -> Result<(), RegistryError> {
        let save_err = |reason: String| RegistryError::SaveFailed {
            path: self.path.display().to_string(),
            reason,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
        }
        let content = serde_json::to_string_pretty(file).map_err(|e| save_err(e.to_string()))?;

        // Write then rename so readers never see a truncated file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| save_err(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| save_err(e.to_string()))?;

        tracing::debug!("Saved registry to {:?}", self.path);
        Ok(())
    }
}
