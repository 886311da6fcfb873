//! Single-writer lock for the index
//!
//! Whichever process holds the flock on the lock file is the only one
//! allowed to mutate the vector store. The OS releases the lock if the
//! holder dies.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Guard that holds the exclusive writer lock until dropped
pub struct WriterLock {
    _file: File,
    path: PathBuf,
}

impl WriterLock {
    /// Try to become the writer, non-blocking
    ///
    /// Returns:
    /// - `Ok(Some(guard))` if the lock was acquired
    /// - `Ok(None)` if another process holds the lock
    /// - `Err(...)` on IO errors
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).context("Failed to create lock directory")?;
        }

        let file = File::create(lock_path).context("Failed to create lock file")?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::debug!("Acquired writer lock: {:?}", lock_path);
                Ok(Some(Self {
                    _file: file,
                    path: lock_path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                tracing::debug!("Writer lock held by another process: {:?}", lock_path);
                Ok(None)
            }
            Err(e) => Err(e).context("Failed to acquire writer lock"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WriterLock {
    fn drop(&mut self) {
        // The lock file is left in place and reused
        tracing::debug!("Releasing writer lock: {:?}", self.path);
    }
}
