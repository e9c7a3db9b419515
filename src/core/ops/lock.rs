//! core::ops::lock
//!
//! Exclusive repository lock.
//!
//! Commands that write objects, delete objects or touch the workspace hold
//! an advisory lock on `<control_dir>/tmp/lock` until they return. Taking
//! the lock never blocks: a second writer fails right away.
//!
//! ```ignore
//! let paths = DataPaths::for_root(Path::new("/repo"));
//! let _lock = RepoLock::acquire(&paths)?;
//! odb.add(&path, &oid, false)?;
//! ```

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

use crate::core::paths::DataPaths;

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "Unable to acquire lock '{}'. Most likely another dvc-data process is running.",
        .0.display()
    )]
    Locked(PathBuf),

    #[error("failed to open lock '{}': {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Held repository lock. Dropping it unlocks.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    file: File,
}

impl RepoLock {
    /// Lock the repository described by `paths`.
    pub fn acquire(paths: &DataPaths) -> Result<Self, LockError> {
        let path = paths.lock_path();
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(io_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("acquired lock '{}'", path.display());
                Ok(Self { path, file })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(LockError::Locked(path)),
            Err(e) => Err(io_err(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            debug!("failed to unlock '{}': {e}", self.path.display());
        }
    }
}
