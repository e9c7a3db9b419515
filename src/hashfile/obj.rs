//! hashfile::obj

use std::fmt;
use std::path::PathBuf;

use crate::core::hash_info::HashInfo;

/// A stored object: where it lives and what it hashes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashFile {
    pub path: PathBuf,
    pub hash_info: HashInfo,
}

impl HashFile {
    pub fn new(path: PathBuf, hash_info: HashInfo) -> Self {
        Self { path, hash_info }
    }

    /// The object id (hash value).
    pub fn oid(&self) -> &str {
        self.hash_info.value().unwrap_or_default()
    }
}

impl fmt::Display for HashFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object {}", self.oid())
    }
}
