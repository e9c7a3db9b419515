//! hashfile::state
//!
//! Persistent cache of computed hashes and of links created by checkout.
//!
//! # Storage
//!
//! - `<tmp_dir>/hashes/local/db.json` - absolute path -> `{checksum, size, hash_info}`
//! - `<tmp_dir>/links/db.json` - root-relative path -> `[inode, mtime]`
//!
//! Both files are loaded lazily, modified in memory and flushed on
//! [`StateBase::close`] (or drop). A flush takes an exclusive `fs2` lock on
//! a sibling `db.lock`, merges the pending changes into the current file
//! contents and rewrites it atomically, so concurrent processes do not lose
//! each other's entries.
//!
//! # Invalidation
//!
//! An entry is only returned while the path's checksum (md5 over inode,
//! mtime and size) still matches the one recorded with it.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::hash::hash_bytes;
use super::ignore::Ignore;
use super::utils::get_mtime_and_size;
use crate::core::fsutil;
use crate::core::hash_info::HashInfo;
use crate::core::meta::Meta;

const DB_FILE: &str = "db.json";
const LOCK_FILE: &str = "db.lock";

/// Errors from flushing the state database.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to write state database '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to lock state database '{path}': {source}")]
    Lock { path: PathBuf, source: io::Error },
}

/// Hash cache interface used by hashing, the object database and checkout.
pub trait StateBase: Send + Sync {
    /// Record `hash_info` for `path` as of its current checksum.
    fn save(&self, path: &Path, hash_info: &HashInfo, size: Option<u64>);

    /// Cached `(meta, hash)` for `path` if it is still up to date.
    fn get(&self, path: &Path) -> Option<(Meta, HashInfo)>;

    /// Record many hashes at once.
    fn save_many(&self, entries: &[(PathBuf, HashInfo)]) {
        for (path, hash_info) in entries {
            self.save(path, hash_info, None);
        }
    }

    /// Remember that `path` was produced by checkout.
    fn save_link(&self, path: &Path);

    /// Flush pending changes to disk.
    fn close(&self) -> Result<(), StateError>;
}

/// State that remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct StateNoop;

impl StateBase for StateNoop {
    fn save(&self, _path: &Path, _hash_info: &HashInfo, _size: Option<u64>) {}

    fn get(&self, _path: &Path) -> Option<(Meta, HashInfo)> {
        None
    }

    fn save_link(&self, _path: &Path) {}

    fn close(&self) -> Result<(), StateError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct HashEntry {
    checksum: String,
    size: u64,
    hash_info: Map<String, Value>,
}

/// Link record: inode and mtime token at checkout time.
type LinkEntry = (u64, String);

/// One lazily-loaded JSON map file with pending changes.
#[derive(Debug)]
struct JsonStore<V> {
    dir: PathBuf,
    entries: BTreeMap<String, V>,
    loaded: bool,
    dirty: BTreeSet<String>,
    removed: BTreeSet<String>,
}

impl<V: Serialize + DeserializeOwned + Clone> JsonStore<V> {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            entries: BTreeMap::new(),
            loaded: false,
            dirty: BTreeSet::new(),
            removed: BTreeSet::new(),
        }
    }

    fn db_path(&self) -> PathBuf {
        self.dir.join(DB_FILE)
    }

    fn read_disk(&self) -> BTreeMap<String, V> {
        let path = self.db_path();
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("ignoring unreadable state database '{}': {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        }
    }

    fn ensure_loaded(&mut self) {
        if !self.loaded {
            self.entries = self.read_disk();
            self.loaded = true;
        }
    }

    fn get(&mut self, key: &str) -> Option<V> {
        self.ensure_loaded();
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: String, value: V) {
        self.ensure_loaded();
        self.removed.remove(&key);
        self.dirty.insert(key.clone());
        self.entries.insert(key, value);
    }

    fn remove(&mut self, key: &str) {
        self.ensure_loaded();
        self.dirty.remove(key);
        self.removed.insert(key.to_string());
        self.entries.remove(key);
    }

    fn keys(&mut self) -> Vec<String> {
        self.ensure_loaded();
        self.entries.keys().cloned().collect()
    }

    fn flush(&mut self) -> Result<(), StateError> {
        if self.dirty.is_empty() && self.removed.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.dir).map_err(|source| StateError::Write {
            path: self.dir.clone(),
            source,
        })?;
        let lock_path = self.dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .and_then(|f| f.lock_exclusive().map(|()| f))
            .map_err(|source| StateError::Lock {
                path: lock_path.clone(),
                source,
            })?;

        let mut merged = self.read_disk();
        for key in &self.removed {
            merged.remove(key);
        }
        for key in &self.dirty {
            if let Some(value) = self.entries.get(key) {
                merged.insert(key.clone(), value.clone());
            }
        }

        let path = self.db_path();
        let result = serde_json::to_vec(&merged)
            .map_err(io::Error::from)
            .and_then(|bytes| fsutil::write_atomic(&path, &bytes))
            .map_err(|source| StateError::Write { path, source });
        let _ = lock.unlock();
        result?;

        self.entries = merged;
        self.dirty.clear();
        self.removed.clear();
        Ok(())
    }
}

#[derive(Debug)]
struct Stores {
    hashes: JsonStore<HashEntry>,
    links: JsonStore<LinkEntry>,
}

/// Hash and link state persisted under a tmp directory.
pub struct State {
    root_dir: PathBuf,
    tmp_dir: PathBuf,
    ignore: Option<Box<dyn Ignore>>,
    stores: Mutex<Stores>,
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("State")
            .field("root_dir", &self.root_dir)
            .field("tmp_dir", &self.tmp_dir)
            .finish_non_exhaustive()
    }
}

impl State {
    pub fn new(root_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>) -> Self {
        let tmp_dir = tmp_dir.into();
        let stores = Stores {
            hashes: JsonStore::new(tmp_dir.join("hashes").join("local")),
            links: JsonStore::new(tmp_dir.join("links")),
        };
        Self {
            root_dir: root_dir.into(),
            tmp_dir,
            ignore: None,
            stores: Mutex::new(stores),
        }
    }

    pub fn with_ignore(mut self, ignore: Box<dyn Ignore>) -> Self {
        self.ignore = Some(ignore);
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    fn with_stores<T>(&self, f: impl FnOnce(&mut Stores) -> T) -> T {
        let mut guard = match self.stores.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// md5 over `[inode, mtime, size]` of `path`.
    fn checksum(&self, path: &Path) -> io::Result<(String, u64)> {
        let (mtime, size) = get_mtime_and_size(path, self.ignore.as_deref())?;
        let inode = fsutil::inode(path)?;
        let token = serde_json::to_vec(&(inode, &mtime, size)).map_err(io::Error::from)?;
        Ok((hash_bytes(&token, "md5").unwrap_or_default(), size))
    }

    fn key(path: &Path) -> String {
        std::path::absolute(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .into_owned()
    }

    fn relative_key(&self, path: &Path) -> String {
        let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        fsutil::relpath(&abs, &self.root_dir)
            .to_string_lossy()
            .into_owned()
    }

    /// Previously linked paths that are neither in `used` nor modified
    /// since checkout.
    pub fn get_unused_links(&self, used: &[PathBuf]) -> Vec<String> {
        let used: BTreeSet<PathBuf> = used
            .iter()
            .map(|p| std::path::absolute(p).unwrap_or_else(|_| p.clone()))
            .collect();

        self.with_stores(|stores| {
            let mut unused = Vec::new();
            for relative in stores.links.keys() {
                let path = self.root_dir.join(&relative);
                if used.contains(&path) || !path.exists() {
                    continue;
                }
                let (Ok(inode), Ok((mtime, _))) = (
                    fsutil::inode(&path),
                    get_mtime_and_size(&path, self.ignore.as_deref()),
                ) else {
                    continue;
                };
                if stores.links.get(&relative) == Some((inode, mtime)) {
                    debug!("Removing '{}' as unused link.", path.display());
                    unused.push(relative);
                }
            }
            unused
        })
    }

    /// Delete `unused` link paths from the workspace and forget them.
    pub fn remove_links(&self, unused: &[String]) -> io::Result<()> {
        for relative in unused {
            fsutil::remove(&self.root_dir.join(relative))?;
        }
        self.with_stores(|stores| {
            for relative in unused {
                stores.links.remove(relative);
            }
        });
        Ok(())
    }
}

impl StateBase for State {
    fn save(&self, path: &Path, hash_info: &HashInfo, size: Option<u64>) {
        let (checksum, actual_size) = match self.checksum(path) {
            Ok(value) => value,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "not saving state entry");
                return;
            }
        };
        let entry = HashEntry {
            checksum,
            size: size.unwrap_or(actual_size),
            hash_info: hash_info.to_dict(),
        };
        let key = Self::key(path);
        self.with_stores(|stores| stores.hashes.set(key, entry));
    }

    fn get(&self, path: &Path) -> Option<(Meta, HashInfo)> {
        let key = Self::key(path);
        let entry = self.with_stores(|stores| stores.hashes.get(&key))?;
        let (actual, _) = self.checksum(path).ok()?;
        if entry.checksum != actual {
            return None;
        }
        Some((Meta::with_size(entry.size), HashInfo::from_dict(&entry.hash_info)))
    }

    fn save_link(&self, path: &Path) {
        let Ok((mtime, _)) = get_mtime_and_size(path, self.ignore.as_deref()) else {
            return;
        };
        let Ok(inode) = fsutil::inode(path) else {
            return;
        };
        let relative = self.relative_key(path);
        self.with_stores(|stores| stores.links.set(relative, (inode, mtime)));
    }

    fn close(&self) -> Result<(), StateError> {
        self.with_stores(|stores| {
            stores.hashes.flush()?;
            stores.links.flush()
        })
    }
}

impl Drop for State {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}", e);
        }
    }
}
