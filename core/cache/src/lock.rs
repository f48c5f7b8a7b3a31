//! Advisory locks over shared cache state.
//!
//! The Mercurial mirror and each version directory are guarded by an
//! exclusive file lock at `<root>/locks/<key>.lock`, so two vengo processes
//! working on the same cache root serialize instead of interleaving writes.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Exclusive lock held until dropped.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
    _file: File,
}

impl CacheLock {
    /// Blocks until the lock for `key` under `dir` is acquired.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Lock`] if the lock file cannot be created or locked.
    pub fn acquire(dir: &Path, key: &str) -> CacheResult<Self> {
        let path = dir.join(format!("{key}.lock"));
        let lock_error = |source| CacheError::Lock {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(lock_error)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(lock_error)?;

        debug!(lock = %path.display(), "acquiring cache lock");
        file.lock_exclusive().map_err(lock_error)?;

        Ok(Self { path, _file: file })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
