//! hashfile::db
//!
//! Content-addressed object databases.
//!
//! # Layout
//!
//! Objects live at `<path>/<oid[0:2]>/<oid[2:]>`. Tree objects keep their
//! `.dir` suffix in the file name, so a listing can tell them apart without
//! reading them.
//!
//! # Stores
//!
//! - [`HashFileDB`] - the on-disk cache
//! - [`ReferenceDB`] - in-memory staging area produced by `build`
//!
//! Both implement [`ObjectStore`], which is all that status, transfer and
//! tree loading need from a source.
//!
//! [`migrate`] re-hashes a database into one with another algorithm.

pub mod index;
pub mod migrate;
pub mod reference;

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::hash::{hash_file, HashError};
use super::link::{LinkType, DEFAULT_CACHE_TYPES};
use super::obj::HashFile;
use super::state::{StateBase, StateNoop};
use super::tree::Tree;
use crate::core::fsutil;
use crate::core::hash_info::HashInfo;

pub use index::{get_index, JsonObjectDbIndex, NoopObjectDbIndex, ObjectDbIndex};
pub use reference::ReferenceDB;

/// Mode given to protected cache objects.
pub const CACHE_MODE: u32 = 0o444;

/// Suffix of legacy unpacked directory trees next to `.dir` objects.
pub const UNPACKED_DIR_SUFFIX: &str = ".unpacked";

/// Errors from object database operations.
#[derive(Debug, Error)]
pub enum OdbError {
    #[error("object {0} does not exist")]
    NotFound(String),

    #[error("ambiguous oid '{0}'")]
    Ambiguous(String),

    #[error("object {0} is corrupted")]
    Corrupted(String),

    #[error("can't unprotect non-existing data '{}'", .0.display())]
    UnprotectMissing(PathBuf),

    #[error("Cannot {op} read-only ODB '{}'", .path.display())]
    ReadOnly { op: &'static str, path: PathBuf },

    #[error("unsupported hash algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl OdbError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        OdbError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors that mean "the object is not there".
    pub fn is_not_found(&self) -> bool {
        match self {
            OdbError::NotFound(_) => true,
            OdbError::Io { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Raw OS error code of an underlying I/O failure.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            OdbError::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    fn from_hash(oid: &str, path: &Path, err: HashError) -> Self {
        match err {
            HashError::UnsupportedAlgorithm(name) => OdbError::UnsupportedAlgorithm(name),
            HashError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
                OdbError::NotFound(oid.to_string())
            }
            HashError::Io(e) => OdbError::io(path, e),
        }
    }
}

/// Where an object's content can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blob {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl Blob {
    pub fn read(&self) -> io::Result<Vec<u8>> {
        match self {
            Blob::File(path) => fs::read(path),
            Blob::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Read access shared by every object store.
pub trait ObjectStore: Send + Sync {
    /// Algorithm used for ids in this store.
    fn hash_name(&self) -> &str;

    /// Identity of the store; two handles with the same location are the
    /// same store.
    fn location(&self) -> String;

    /// Handle to the object `oid` (which may not exist).
    fn get(&self, oid: &str) -> HashFile;

    fn exists(&self, oid: &str) -> bool;

    /// Verify that `oid` is present and, with `check_hash`, intact.
    fn check(&self, oid: &str, check_hash: bool) -> Result<(), OdbError>;

    /// Where the content of `oid` can be read from.
    fn source(&self, oid: &str) -> Result<Blob, OdbError>;

    /// Every object id in the store.
    fn all(&self) -> Result<Vec<String>, OdbError>;

    /// Staging stores hold references, so every object they know about
    /// counts as present.
    fn is_staging(&self) -> bool {
        false
    }

    /// Object content.
    fn read(&self, oid: &str) -> Result<Vec<u8>, OdbError> {
        let blob = self.source(oid)?;
        blob.read().map_err(|e| match (e.kind(), &blob) {
            (io::ErrorKind::NotFound, _) => OdbError::NotFound(oid.to_string()),
            (_, Blob::File(path)) => OdbError::io(path.clone(), e),
            (_, Blob::Bytes(_)) => OdbError::io(PathBuf::new(), e),
        })
    }

    /// The subset of `oids` that pass [`ObjectStore::check`] without a hash
    /// comparison.
    fn oids_exist(&self, oids: &BTreeSet<String>) -> BTreeSet<String> {
        oids.iter()
            .filter(|oid| self.check(oid, false).is_ok())
            .cloned()
            .collect()
    }
}

/// Local on-disk object database.
pub struct HashFileDB {
    path: PathBuf,
    hash_name: String,
    cache_types: Vec<LinkType>,
    verify: bool,
    read_only: bool,
    tmp_dir: Option<PathBuf>,
    file_mode: u32,
    dir_mode: Option<u32>,
    state: Arc<dyn StateBase>,
}

impl std::fmt::Debug for HashFileDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashFileDB")
            .field("path", &self.path)
            .field("hash_name", &self.hash_name)
            .field("cache_types", &self.cache_types)
            .field("verify", &self.verify)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl HashFileDB {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hash_name: super::hash::DEFAULT_ALGORITHM.to_string(),
            cache_types: DEFAULT_CACHE_TYPES.to_vec(),
            verify: false,
            read_only: false,
            tmp_dir: None,
            file_mode: 0o644,
            dir_mode: None,
            state: Arc::new(StateNoop),
        }
    }

    pub fn with_hash_name(mut self, name: impl Into<String>) -> Self {
        self.hash_name = name.into();
        self
    }

    pub fn with_cache_types(mut self, types: Vec<LinkType>) -> Self {
        if !types.is_empty() {
            self.cache_types = types;
        }
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Group-writable objects and setgid directories.
    pub fn with_shared(mut self, shared: bool) -> Self {
        if shared {
            self.file_mode = 0o664;
            self.dir_mode = Some(0o2775);
        } else {
            self.file_mode = 0o644;
            self.dir_mode = None;
        }
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(tmp_dir.into());
        self
    }

    pub fn with_state(mut self, state: Arc<dyn StateBase>) -> Self {
        self.state = state;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache_types(&self) -> &[LinkType] {
        &self.cache_types
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    pub fn tmp_dir(&self) -> Option<&Path> {
        self.tmp_dir.as_deref()
    }

    pub fn state(&self) -> &dyn StateBase {
        self.state.as_ref()
    }

    pub fn oid_to_path(&self, oid: &str) -> PathBuf {
        let split = oid.char_indices().nth(2).map_or(oid.len(), |(i, _)| i);
        self.path.join(&oid[..split]).join(&oid[split..])
    }

    /// Inverse of [`HashFileDB::oid_to_path`]. Only paths inside a
    /// two-character hex directory map to an oid.
    pub fn path_to_oid(&self, path: &Path) -> Option<String> {
        let name = path.file_name()?.to_str()?;
        let parent = path.parent()?.file_name()?.to_str()?;
        if parent.len() != 2 || !parent.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(format!("{}{}", parent, name))
    }

    /// Oids stored under `prefix` (all oids when `None`).
    pub fn list_oids(&self, prefix: Option<&str>) -> Result<Vec<String>, OdbError> {
        let top = match prefix {
            Some(prefix) => {
                let dir = self.path.join(prefix.get(..2).unwrap_or(prefix));
                if !dir.exists() {
                    return Ok(Vec::new());
                }
                dir
            }
            None => {
                if !self.path.exists() {
                    return Ok(Vec::new());
                }
                self.path.clone()
            }
        };

        let files = fsutil::find(&top).map_err(|e| OdbError::io(&top, e))?;
        let mut oids: Vec<String> = files
            .iter()
            .filter_map(|p| self.path_to_oid(p))
            .filter(|oid| prefix.map_or(true, |p| oid.starts_with(p)))
            .collect();
        oids.sort();
        Ok(oids)
    }

    /// Resolve an abbreviated oid to the single full oid it names.
    pub fn exists_prefix(&self, short: &str) -> Result<String, OdbError> {
        if short.len() <= 2 {
            return Err(OdbError::Ambiguous(short.to_string()));
        }
        if self.oid_to_path(short).exists() {
            return Ok(short.to_string());
        }
        let mut ret = self.list_oids(Some(short))?;
        match ret.len() {
            0 => Err(OdbError::NotFound(short.to_string())),
            1 => Ok(ret.remove(0)),
            _ => Err(OdbError::Ambiguous(short.to_string())),
        }
    }

    fn ensure_writable(&self, op: &'static str) -> Result<(), OdbError> {
        if self.read_only {
            return Err(OdbError::ReadOnly {
                op,
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn makedirs(&self, dir: &Path) -> Result<(), OdbError> {
        fs::create_dir_all(dir).map_err(|e| OdbError::io(dir, e))?;
        if let Some(mode) = self.dir_mode {
            let _ = fsutil::set_mode(dir, mode);
        }
        Ok(())
    }

    /// Store the file at `path` as `oid`. Returns whether anything was
    /// written.
    pub fn add(&self, path: &Path, oid: &str, hardlink: bool) -> Result<bool, OdbError> {
        self.add_blob(&Blob::File(path.to_path_buf()), oid, hardlink)
    }

    /// Store an in-memory object.
    pub fn add_bytes(&self, oid: &str, bytes: &[u8]) -> Result<bool, OdbError> {
        self.add_blob(&Blob::Bytes(bytes.to_vec()), oid, false)
    }

    /// Store `blob` as `oid`, skipping the write when the object already
    /// exists. The object ends up protected and recorded in state.
    pub fn add_blob(&self, blob: &Blob, oid: &str, hardlink: bool) -> Result<bool, OdbError> {
        self.ensure_writable("add to")?;

        if self.verify {
            // Drops a corrupted copy so it gets rewritten below
            let _ = self.check(oid, true);
        }

        let cache_path = self.oid_to_path(oid);
        let mut transferred = false;
        if !cache_path.exists() {
            if let Some(parent) = cache_path.parent() {
                self.makedirs(parent)?;
            }
            let tmp = fsutil::tmp_fname(&cache_path);
            let written = match blob {
                Blob::File(src) => {
                    if hardlink && fs::hard_link(src, &tmp).is_ok() {
                        Ok(())
                    } else {
                        fs::copy(src, &tmp).map(|_| ())
                    }
                }
                Blob::Bytes(bytes) => fs::write(&tmp, bytes),
            };
            let moved = written.and_then(|()| fs::rename(&tmp, &cache_path));
            if let Err(e) = moved {
                let _ = fs::remove_file(&tmp);
                return Err(match (e.kind(), blob) {
                    (io::ErrorKind::NotFound, Blob::File(src)) => OdbError::io(src.clone(), e),
                    _ => OdbError::io(&cache_path, e),
                });
            }
            if !hardlink {
                let _ = fsutil::set_mode(&cache_path, self.file_mode);
            }
            transferred = true;
        }

        if self.verify {
            match self.check(oid, true) {
                Ok(()) => {}
                Err(e) if e.is_not_found() || matches!(e, OdbError::Corrupted(_)) => {
                    return Ok(transferred);
                }
                Err(e) => return Err(e),
            }
        }
        self.protect(&cache_path);
        self.state
            .save(&cache_path, &HashInfo::new(self.hash_name.as_str(), oid), None);
        Ok(transferred)
    }

    /// Remove an object.
    pub fn delete(&self, oid: &str) -> Result<(), OdbError> {
        self.ensure_writable("delete from")?;
        let path = self.oid_to_path(oid);
        fsutil::remove(&path).map_err(|e| OdbError::io(path, e))
    }

    /// Remove the legacy `<oid>.unpacked` directory of a tree object.
    pub fn remove_unpacked_dir(&self, oid: &str) -> Result<(), OdbError> {
        let mut name = self.oid_to_path(oid).into_os_string();
        name.push(UNPACKED_DIR_SUFFIX);
        let path = PathBuf::from(name);
        fsutil::remove(&path).map_err(|e| OdbError::io(path, e))
    }

    /// Make a stored object read-only. Failure is not fatal.
    pub fn protect(&self, path: &Path) {
        if let Err(e) = fsutil::set_mode(path, CACHE_MODE) {
            debug!("failed to protect '{}': {}", path.display(), e);
        }
    }

    pub fn is_protected(&self, path: &Path) -> bool {
        fsutil::permission_bits(path).is_ok_and(|mode| mode == CACHE_MODE)
    }

    /// Give a workspace path its own writable copy of the data.
    ///
    /// Symlinks and hardlinks are replaced by a copy; every file ends up
    /// with the database's file mode.
    pub fn unprotect(&self, path: &Path) -> Result<(), OdbError> {
        if !path.exists() {
            return Err(OdbError::UnprotectMissing(path.to_path_buf()));
        }
        if path.is_dir() {
            for file in fsutil::find(path).map_err(|e| OdbError::io(path, e))? {
                self.unprotect_file(&file)?;
            }
            Ok(())
        } else {
            self.unprotect_file(path)
        }
    }

    fn unprotect_file(&self, path: &Path) -> Result<(), OdbError> {
        if super::link::is_copy(path) {
            debug!(
                "Skipping copying for '{}', since it is not a symlink or a hardlink.",
                path.display()
            );
        } else {
            debug!("Unprotecting '{}'", path.display());
            let parent = path.parent().unwrap_or(Path::new("."));
            let tmp = parent.join(format!(".{}", uuid::Uuid::new_v4().simple()));
            // Copy first so readers never see a partial file
            fs::copy(path, &tmp).map_err(|e| OdbError::io(path, e))?;
            fsutil::remove(path).map_err(|e| OdbError::io(path, e))?;
            fs::rename(&tmp, path).map_err(|e| OdbError::io(path, e))?;
        }
        fsutil::set_mode(path, self.file_mode).map_err(|e| OdbError::io(path, e))
    }

    /// Add the owner exec bit. Failure is not fatal.
    pub fn set_exec(&self, path: &Path) {
        match fsutil::permission_bits(path) {
            Ok(mode) => {
                if let Err(e) = fsutil::set_mode(path, mode | 0o100) {
                    debug!("failed to chmod '{:o}' '{}': {}", mode | 0o100, path.display(), e);
                }
            }
            Err(e) => debug!("failed to stat '{}': {}", path.display(), e),
        }
    }
}

impl ObjectStore for HashFileDB {
    fn hash_name(&self) -> &str {
        &self.hash_name
    }

    fn location(&self) -> String {
        std::path::absolute(&self.path)
            .unwrap_or_else(|_| self.path.clone())
            .to_string_lossy()
            .into_owned()
    }

    fn get(&self, oid: &str) -> HashFile {
        HashFile::new(
            self.oid_to_path(oid),
            HashInfo::new(self.hash_name.as_str(), oid),
        )
    }

    fn exists(&self, oid: &str) -> bool {
        self.oid_to_path(oid).is_file()
    }

    /// Protected objects are trusted. Without `check_hash` only existence
    /// is verified; with it, a corrupted object is deleted.
    fn check(&self, oid: &str, check_hash: bool) -> Result<(), OdbError> {
        let path = self.oid_to_path(oid);
        if self.is_protected(&path) {
            return Ok(());
        }

        if !check_hash {
            if !path.exists() {
                return Err(OdbError::NotFound(oid.to_string()));
            }
            return Ok(());
        }

        let (_, actual) = hash_file(&path, &self.hash_name, Some(self.state.as_ref()))
            .map_err(|e| OdbError::from_hash(oid, &path, e))?;
        let actual = actual.value().unwrap_or_default();
        let base = |v: &str| v.split('.').next().unwrap_or_default().to_string();
        if base(actual) != base(oid) {
            debug!("corrupted cache file '{}'.", path.display());
            let _ = fsutil::remove(&path);
            return Err(OdbError::Corrupted(oid.to_string()));
        }

        self.protect(&path);
        Ok(())
    }

    fn source(&self, oid: &str) -> Result<Blob, OdbError> {
        Ok(Blob::File(self.oid_to_path(oid)))
    }

    /// Every oid, skipping temp files and unpacked directories.
    fn all(&self) -> Result<Vec<String>, OdbError> {
        Ok(self
            .list_oids(None)?
            .into_iter()
            .filter(|oid| oid.matches('.').count() <= 1)
            .collect())
    }
}

/// Store a tree's serialized form in `odb` and point the tree at it.
pub fn add_update_tree(odb: &HashFileDB, tree: &mut Tree) -> Result<(), OdbError> {
    let oid = tree
        .oid()
        .map(str::to_string)
        .ok_or_else(|| OdbError::NotFound("<undigested tree>".to_string()))?;
    odb.add_bytes(&oid, &tree.as_bytes())?;
    tree.path = Some(odb.oid_to_path(&oid));
    Ok(())
}
