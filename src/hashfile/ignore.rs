//! hashfile::ignore
//!
//! Filtering of workspace walks.

use std::io;
use std::path::{Path, PathBuf};

use crate::core::fsutil::{self, WalkEntry};

/// Name of the ignore file that must not appear inside a collected directory.
pub const DEFAULT_IGNORE_FILE: &str = ".dvcignore";

/// Decides which workspace paths are left out of builds and state tokens.
pub trait Ignore: Send + Sync {
    /// True when `path` should be skipped. Ignored directories are not
    /// descended into.
    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool;
}

/// Ignore entries whose file name matches one of a fixed set.
#[derive(Debug, Clone, Default)]
pub struct IgnoreNames {
    names: Vec<String>,
}

impl IgnoreNames {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl Ignore for IgnoreNames {
    fn is_ignored(&self, path: &Path, _is_dir: bool) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| self.names.iter().any(|x| x == n))
    }
}

/// [`fsutil::walk`] with ignored entries (and everything below ignored
/// directories) removed.
pub fn walk(top: &Path, ignore: Option<&dyn Ignore>) -> io::Result<Vec<WalkEntry>> {
    let levels = fsutil::walk(top)?;
    let Some(ignore) = ignore else {
        return Ok(levels);
    };

    let mut pruned: Vec<PathBuf> = Vec::new();
    let mut out = Vec::with_capacity(levels.len());
    for mut level in levels {
        if pruned.iter().any(|p| level.root.starts_with(p)) {
            continue;
        }
        let root = level.root.clone();
        level.dirs.retain(|d| {
            let path = root.join(d);
            if ignore.is_ignored(&path, true) {
                pruned.push(path);
                false
            } else {
                true
            }
        });
        level.files.retain(|f| !ignore.is_ignored(&root.join(f), false));
        out.push(level);
    }
    Ok(out)
}

/// Every non-ignored file below `top`.
pub fn find(top: &Path, ignore: Option<&dyn Ignore>) -> io::Result<Vec<PathBuf>> {
    Ok(walk(top, ignore)?
        .into_iter()
        .flat_map(|e| {
            let root = e.root;
            e.files.into_iter().map(move |f| root.join(f))
        })
        .collect())
}
