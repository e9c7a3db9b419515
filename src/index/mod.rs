//! index
//!
//! The data index: a key-ordered map from workspace path parts to the
//! meta and hash of each file and directory.
//!
//! Directory entries whose hash names a stored tree are expanded lazily:
//! the first lookup below such an entry loads the tree from the entry's
//! storage and inserts its children.
//!
//! # Modules
//!
//! - [`data_index`] - entries, storage mapping, [`DataIndex`]
//! - [`diff`] - breadth-first index comparison with rename detection
//! - [`build`] - index a workspace path; carry hashes forward with [`update`]
//! - [`checkout`] - materialize an index in a workspace
//! - [`save`] - hash entries and store them in an object database
//! - [`view`] - filtered read-only views
//! - [`serialize`] - JSON and on-disk database formats

pub mod build;
pub mod checkout;
pub mod data_index;
pub mod diff;
pub mod save;
pub mod serialize;
pub mod view;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use build::{add, build, build_entry, update};
pub use checkout::{checkout, CheckoutChanges, IndexCheckoutOptions};
pub use data_index::{
    commit, fetch, push, BaseDataIndex, DataIndex, DataIndexEntry, EntryInfo, EntryType, Storage,
    StorageMapping,
};
pub use diff::{diff, Change, ChangeKind, DiffOptions};
pub use save::{md5, save};
pub use view::{view, DataIndexView};

use crate::hashfile::build::BuildError;
use crate::hashfile::checkout::CheckoutError;
use crate::hashfile::db::OdbError;
use crate::hashfile::hash::HashError;
use crate::hashfile::transfer::TransferError;

/// Key of an index entry: workspace path parts.
pub type DataIndexKey = Vec<String>;

/// Render a key the way it is written on disk.
pub fn key_to_path(key: &[String]) -> String {
    key.join("/")
}

/// Inverse of [`key_to_path`]. The empty string is the root key.
pub fn path_to_key(path: &str) -> DataIndexKey {
    if path.is_empty() {
        return Vec::new();
    }
    path.split('/').map(String::from).collect()
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("'{0}' not found in the index")]
    KeyNotFound(String),

    /// The key is an interior node: other entries live below it, but it has
    /// no entry of its own.
    #[error("'{0}' is a prefix without an entry")]
    ShortKey(String),

    #[error("failed to load the tree of '{0}'")]
    TreeNotLoaded(String),

    #[error("no storage configured for '{0}'")]
    NoStorage(String),

    #[error("invalid index entry '{key}': {reason}")]
    InvalidEntry { key: String, reason: String },

    #[error(transparent)]
    Odb(#[from] OdbError),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("{}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }
}
