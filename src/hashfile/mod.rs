//! hashfile
//!
//! Content-addressed objects and the operations on them.
//!
//! # Modules
//!
//! - [`hash`] - streaming digests and `hash_file`
//! - [`tree`] - directory objects, merge
//! - [`db`] - object databases and the staging store
//! - [`build`] - workspace path to staged objects
//! - [`diff`] / [`checkout`] - compare and materialize objects
//! - [`status`] / [`transfer`] / [`gc`] - move and prune objects between stores
//! - [`state`] - persistent hash cache

pub mod build;
pub mod checkout;
pub mod db;
pub mod diff;
pub mod gc;
pub mod hash;
pub mod ignore;
pub mod istextfile;
pub mod link;
pub mod obj;
pub mod pyjson;
pub mod state;
pub mod status;
pub mod transfer;
pub mod tree;
pub mod utils;

use db::{ObjectStore, OdbError};
use obj::HashFile;
use tree::Tree;

use crate::core::hash_info::HashInfo;

/// A file object or a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    File(HashFile),
    Tree(Tree),
}

impl Object {
    pub fn hash_info(&self) -> Option<&HashInfo> {
        match self {
            Object::File(obj) => Some(&obj.hash_info),
            Object::Tree(tree) => tree.hash_info.as_ref(),
        }
    }

    pub fn oid(&self) -> Option<&str> {
        self.hash_info().and_then(HashInfo::value)
    }

    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Object::Tree(tree) => Some(tree),
            Object::File(_) => None,
        }
    }

    /// Number of file entries: tree length, or one for a file.
    pub fn len(&self) -> usize {
        match self {
            Object::File(_) => 1,
            Object::Tree(tree) => tree.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object {}", self.oid().unwrap_or("None"))
    }
}

/// Load the object named by `hash_info`: trees are parsed, files are
/// handles into `odb`.
pub fn load(odb: &dyn ObjectStore, hash_info: &HashInfo) -> Result<Object, OdbError> {
    if hash_info.is_dir() {
        return Ok(Object::Tree(Tree::load(odb, hash_info)?));
    }
    Ok(Object::File(odb.get(hash_info.value().unwrap_or_default())))
}

/// Check an object and, for a tree, every entry it references.
pub fn check(odb: &dyn ObjectStore, obj: &Object, check_hash: bool) -> Result<(), OdbError> {
    if let Object::Tree(tree) = obj {
        for (_, _, hash_info) in tree.iter() {
            odb.check(hash_info.value().unwrap_or_default(), check_hash)?;
        }
    }
    odb.check(obj.oid().unwrap_or_default(), check_hash)
}
