//! core::hash_info
//!
//! Identity of a stored object: the hash algorithm name plus the digest.
//!
//! Directory objects carry a `.dir` suffix on their digest so that a tree
//! and a file with identical bytes never share an object id.
//!
//! # Example
//!
//! ```
//! use dvc_data::core::hash_info::HashInfo;
//!
//! let hi = HashInfo::new("md5", "5ea40360f5b4ec688df672a4db9c17d1.dir");
//! assert!(hi.is_dir());
//! assert_eq!(hi.as_raw().value(), Some("5ea40360f5b4ec688df672a4db9c17d1"));
//! assert_eq!(hi.to_string(), "md5: 5ea40360f5b4ec688df672a4db9c17d1.dir");
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Value};

/// Suffix appended to the digest of tree objects.
pub const HASH_DIR_SUFFIX: &str = ".dir";

/// Hash name plus value.
///
/// Equality, ordering and hashing only look at `(name, value)`; `obj_name`
/// is informational.
#[derive(Debug, Clone, Default)]
pub struct HashInfo {
    pub name: Option<String>,
    pub value: Option<String>,
    pub obj_name: Option<String>,
}

impl HashInfo {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: Some(value.into()),
            obj_name: None,
        }
    }

    /// The digest, if any.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// The algorithm name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True when there is no digest (or an empty one).
    pub fn is_empty(&self) -> bool {
        self.value.as_deref().map_or(true, str::is_empty)
    }

    /// True when the digest names a tree object.
    pub fn is_dir(&self) -> bool {
        self.value
            .as_deref()
            .is_some_and(|v| v.ends_with(HASH_DIR_SUFFIX))
    }

    /// Copy with the `.dir` suffix stripped from the digest.
    pub fn as_raw(&self) -> HashInfo {
        let value = self
            .value
            .as_deref()
            .map(|v| v.split(HASH_DIR_SUFFIX).next().unwrap_or(v).to_string());
        HashInfo {
            name: self.name.clone(),
            value,
            obj_name: self.obj_name.clone(),
        }
    }

    /// Single-key map `{name: value}`, or an empty map for an empty hash.
    pub fn to_dict(&self) -> Map<String, Value> {
        let mut ret = Map::new();
        if self.is_empty() {
            return ret;
        }
        if let (Some(name), Some(value)) = (&self.name, &self.value) {
            ret.insert(name.clone(), Value::String(value.clone()));
        }
        ret
    }

    /// Inverse of [`HashInfo::to_dict`].
    ///
    /// An empty map yields an empty hash. Only the first string entry is
    /// considered.
    pub fn from_dict(d: &Map<String, Value>) -> HashInfo {
        d.iter()
            .find_map(|(name, value)| value.as_str().map(|v| HashInfo::new(name.as_str(), v)))
            .unwrap_or_default()
    }
}

impl PartialEq for HashInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl Eq for HashInfo {}

impl Hash for HashInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.value.hash(state);
    }
}

impl PartialOrd for HashInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HashInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.name, &self.value).cmp(&(&other.name, &other.value))
    }
}

impl fmt::Display for HashInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.name.as_deref().unwrap_or("None"),
            self.value.as_deref().unwrap_or("None")
        )
    }
}
