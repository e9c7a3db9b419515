//! hashfile::db::reference
//!
//! Staging store that remembers where objects come from without copying
//! them anywhere.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::{Blob, ObjectStore, OdbError};
use crate::hashfile::obj::HashFile;
use crate::core::hash_info::HashInfo;

/// In-memory map of oid to content source.
#[derive(Debug, Clone)]
pub struct ReferenceDB {
    hash_name: String,
    id: String,
    objects: BTreeMap<String, Blob>,
}

impl ReferenceDB {
    pub fn new(hash_name: impl Into<String>) -> Self {
        Self {
            hash_name: hash_name.into(),
            id: uuid::Uuid::new_v4().simple().to_string(),
            objects: BTreeMap::new(),
        }
    }

    /// Stage a workspace file.
    pub fn add(&mut self, path: PathBuf, oid: &str) {
        self.objects.insert(oid.to_string(), Blob::File(path));
    }

    /// Stage in-memory content (tree listings, stdin input).
    pub fn add_bytes(&mut self, oid: &str, bytes: Vec<u8>) {
        self.objects.insert(oid.to_string(), Blob::Bytes(bytes));
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn oids(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }
}

impl ObjectStore for ReferenceDB {
    fn hash_name(&self) -> &str {
        &self.hash_name
    }

    fn location(&self) -> String {
        format!("memory://staging/{}", self.id)
    }

    fn get(&self, oid: &str) -> HashFile {
        let path = match self.objects.get(oid) {
            Some(Blob::File(path)) => path.clone(),
            _ => PathBuf::from(oid),
        };
        HashFile::new(path, HashInfo::new(self.hash_name.as_str(), oid))
    }

    fn exists(&self, oid: &str) -> bool {
        self.objects.contains_key(oid)
    }

    /// References are trusted as-is.
    fn check(&self, _oid: &str, _check_hash: bool) -> Result<(), OdbError> {
        Ok(())
    }

    fn source(&self, oid: &str) -> Result<Blob, OdbError> {
        self.objects
            .get(oid)
            .cloned()
            .ok_or_else(|| OdbError::NotFound(oid.to_string()))
    }

    fn all(&self) -> Result<Vec<String>, OdbError> {
        Ok(self.objects.keys().cloned().collect())
    }

    fn is_staging(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn staged_objects_resolve_to_sources() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("foo");
        fs::write(&path, "foo").unwrap();

        let mut staging = ReferenceDB::new("md5");
        staging.add(path.clone(), "acbd18db4cc2f85cedef654fccc4a4d8");
        staging.add_bytes("abc.dir", b"[]".to_vec());

        assert!(staging.exists("abc.dir"));
        assert!(!staging.exists("nope"));
        assert_eq!(staging.get("acbd18db4cc2f85cedef654fccc4a4d8").path, path);
        assert_eq!(staging.read("acbd18db4cc2f85cedef654fccc4a4d8").unwrap(), b"foo");
        assert_eq!(staging.read("abc.dir").unwrap(), b"[]");
        assert!(staging.read("nope").unwrap_err().is_not_found());
        assert!(staging.check("nope", true).is_ok());
        assert_eq!(staging.len(), 2);
    }

    #[test]
    fn locations_are_unique() {
        assert_ne!(ReferenceDB::new("md5").location(), ReferenceDB::new("md5").location());
    }
}
