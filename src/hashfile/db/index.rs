//! hashfile::db::index
//!
//! Index of object ids known to exist in an object database, so status
//! queries can skip per-object existence checks.
//!
//! The index file lives at `<tmp_dir>/index/<sha256(odb location)>.json` and
//! maps each oid to whether it is a `.dir` object.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::warn;

use super::{HashFileDB, ObjectStore, OdbError};
use crate::core::fsutil;

const INDEX_DIR: &str = "index";

/// Known-present oids of one object database.
pub trait ObjectDbIndex: Send + Sync {
    fn hashes(&self) -> Vec<String>;

    fn contains(&self, oid: &str) -> bool;

    /// Indexed `.dir` oids.
    fn dir_hashes(&self) -> Vec<String>;

    /// Forget everything, forcing re-indexing later.
    fn clear(&self) -> Result<(), OdbError>;

    fn update(&self, dir_hashes: &[String], file_hashes: &[String]) -> Result<(), OdbError>;

    /// Members of `oids` present in the index.
    fn intersection(&self, oids: &BTreeSet<String>) -> BTreeSet<String>;
}

/// Index for stores that are not indexed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObjectDbIndex;

impl ObjectDbIndex for NoopObjectDbIndex {
    fn hashes(&self) -> Vec<String> {
        Vec::new()
    }

    fn contains(&self, _oid: &str) -> bool {
        false
    }

    fn dir_hashes(&self) -> Vec<String> {
        Vec::new()
    }

    fn clear(&self) -> Result<(), OdbError> {
        Ok(())
    }

    fn update(&self, _dir_hashes: &[String], _file_hashes: &[String]) -> Result<(), OdbError> {
        Ok(())
    }

    fn intersection(&self, _oids: &BTreeSet<String>) -> BTreeSet<String> {
        BTreeSet::new()
    }
}

/// Index persisted as a JSON object file.
#[derive(Debug)]
pub struct JsonObjectDbIndex {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, bool>>,
}

impl JsonObjectDbIndex {
    pub fn open(tmp_dir: &Path, name: &str) -> Self {
        let path = tmp_dir.join(INDEX_DIR).join(format!("{}.json", name));
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("ignoring unreadable object index '{}': {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut BTreeMap<String, bool>) -> T) -> T {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn persist(&self, entries: &BTreeMap<String, bool>) -> Result<(), OdbError> {
        let bytes = serde_json::to_vec(entries)
            .map_err(|e| OdbError::io(&self.path, std::io::Error::from(e)))?;
        fsutil::write_atomic(&self.path, &bytes).map_err(|e| OdbError::io(&self.path, e))
    }
}

impl ObjectDbIndex for JsonObjectDbIndex {
    fn hashes(&self) -> Vec<String> {
        self.with_entries(|entries| entries.keys().cloned().collect())
    }

    fn contains(&self, oid: &str) -> bool {
        self.with_entries(|entries| entries.contains_key(oid))
    }

    fn dir_hashes(&self) -> Vec<String> {
        self.with_entries(|entries| {
            entries
                .iter()
                .filter(|(_, is_dir)| **is_dir)
                .map(|(oid, _)| oid.clone())
                .collect()
        })
    }

    fn clear(&self) -> Result<(), OdbError> {
        self.with_entries(|entries| {
            entries.clear();
            self.persist(entries)
        })
    }

    fn update(&self, dir_hashes: &[String], file_hashes: &[String]) -> Result<(), OdbError> {
        self.with_entries(|entries| {
            for oid in dir_hashes {
                entries.insert(oid.clone(), true);
            }
            for oid in file_hashes {
                entries.insert(oid.clone(), false);
            }
            self.persist(entries)
        })
    }

    fn intersection(&self, oids: &BTreeSet<String>) -> BTreeSet<String> {
        self.with_entries(|entries| {
            oids.iter()
                .filter(|oid| entries.contains_key(*oid))
                .cloned()
                .collect()
        })
    }
}

/// Index for `odb`: persistent when the store has a tmp dir, otherwise a
/// no-op.
pub fn get_index(odb: &HashFileDB) -> Box<dyn ObjectDbIndex> {
    match odb.tmp_dir() {
        Some(tmp_dir) => {
            let name = hex::encode(Sha256::digest(odb.location().as_bytes()));
            Box::new(JsonObjectDbIndex::open(tmp_dir, &name))
        }
        None => Box::new(NoopObjectDbIndex),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn update_and_query() {
        let temp = TempDir::new().unwrap();
        let index = JsonObjectDbIndex::open(temp.path(), "remote");
        index
            .update(&["d.dir".to_string()], &["a".to_string(), "b".to_string()])
            .unwrap();

        assert!(index.contains("a"));
        assert_eq!(index.dir_hashes(), vec!["d.dir".to_string()]);
        assert_eq!(index.hashes().len(), 3);

        let query: BTreeSet<String> = ["a", "z"].iter().map(|s| s.to_string()).collect();
        let hit: Vec<String> = index.intersection(&query).into_iter().collect();
        assert_eq!(hit, vec!["a".to_string()]);
    }

    #[test]
    fn persists_and_clears() {
        let temp = TempDir::new().unwrap();
        {
            let index = JsonObjectDbIndex::open(temp.path(), "remote");
            index.update(&[], &["a".to_string()]).unwrap();
        }
        let index = JsonObjectDbIndex::open(temp.path(), "remote");
        assert!(index.contains("a"));
        index.clear().unwrap();
        assert!(JsonObjectDbIndex::open(temp.path(), "remote").hashes().is_empty());
    }

    #[test]
    fn get_index_depends_on_tmp_dir() {
        let temp = TempDir::new().unwrap();
        let plain = HashFileDB::new(temp.path().join("cache"));
        get_index(&plain).update(&[], &["a".to_string()]).unwrap();
        assert!(!get_index(&plain).contains("a"));

        let indexed = HashFileDB::new(temp.path().join("cache")).with_tmp_dir(temp.path().join("tmp"));
        get_index(&indexed).update(&[], &["a".to_string()]).unwrap();
        assert!(get_index(&indexed).contains("a"));
    }
}
