//! Advisory file locks
//!
//! Locks are `fs2` exclusive locks on files under `.strata/locks/`. Each
//! acquisition opens its own file handle, and flock-style locks conflict
//! between handles, so the same lock serializes threads within one process
//! as well as separate processes. The lock is released when the guard drops.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, StagingError};

/// Held exclusive lock on a lock file
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Blocks until the exclusive lock on `path` is acquired
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StagingError::io("create lock dir", parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StagingError::io("open lock", &path, e))?;

        FileExt::lock_exclusive(&file).map_err(|e| StagingError::io("acquire lock", &path, e))?;

        tracing::trace!(lock = %path.display(), "lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

/// Lock file paths for the two lock domains
#[derive(Debug, Clone)]
pub struct LockSpace {
    dir: PathBuf,
}

impl LockSpace {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serializes every read-modify-write of one changeset
    pub fn changeset(&self, id: &str) -> Result<LockGuard> {
        LockGuard::acquire(self.dir.join(format!("changeset-{}.lock", id)))
    }

    /// Serializes persistence of one model layer
    pub fn layer(&self, name: &str) -> Result<LockGuard> {
        LockGuard::acquire(self.dir.join(format!("layer-{}.lock", name)))
    }

    /// Locks several layers in sorted order so concurrent callers cannot deadlock
    pub fn layers<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<Vec<LockGuard>> {
        let mut names: Vec<&str> = names.into_iter().collect();
        names.sort_unstable();
        names.dedup();
        names.into_iter().map(|name| self.layer(name)).collect()
    }
}
