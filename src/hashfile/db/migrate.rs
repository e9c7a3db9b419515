//! hashfile::db::migrate
//!
//! Move the objects of one database into another that uses a different
//! hash algorithm, e.g. `md5` to `md5-dos2unix`.
//!
//! [`prepare`] re-hashes every source object under the destination's
//! algorithm; [`migrate`] then hardlinks (or copies) each object into the
//! destination under its new oid. Tree objects keep their `.dir` suffix.

use std::path::PathBuf;

use tracing::debug;

use super::{HashFileDB, ObjectStore, OdbError};
use crate::hashfile::hash::hash_file;

/// Source objects paired with their oids in the destination.
#[derive(Debug)]
pub struct Migration<'a> {
    pub src: &'a HashFileDB,
    pub dest: &'a HashFileDB,
    pub objects: Vec<(PathBuf, String)>,
}

/// Re-hash every object in `src` with `dest`'s algorithm.
pub fn prepare<'a>(src: &'a HashFileDB, dest: &'a HashFileDB) -> Result<Migration<'a>, OdbError> {
    let mut objects = Vec::new();
    for oid in src.all()? {
        let path = src.oid_to_path(&oid);
        let (_, hash_info) = hash_file(&path, dest.hash_name(), Some(dest.state()))
            .map_err(|e| OdbError::from_hash(&oid, &path, e))?;
        let mut new_oid = hash_info
            .value()
            .map(str::to_string)
            .ok_or_else(|| OdbError::Corrupted(oid.clone()))?;
        if oid.ends_with(".dir") {
            new_oid.push_str(".dir");
        }
        objects.push((path, new_oid));
    }
    debug!(
        "prepared {} objects from '{}' for '{}'",
        objects.len(),
        src.path().display(),
        dest.path().display()
    );
    Ok(Migration { src, dest, objects })
}

/// Add the prepared objects to the destination. Returns how many were
/// written; objects already present are skipped.
pub fn migrate(migration: &Migration<'_>) -> Result<usize, OdbError> {
    let mut written = 0;
    for (path, oid) in &migration.objects {
        if migration.dest.add(path, oid, true)? {
            written += 1;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fsutil;
    use std::fs;
    use tempfile::TempDir;

    const CRLF: &str = "59b0d7772f0561efb95518f3cb8abc60";
    const LF: &str = "dd8c6a395b5dd36c56d23275028f526c";
    const EMPTY_TREE: &str = "d751713988987e9331980363e24189ce.dir";

    #[test]
    fn md5_to_dos2unix() {
        let temp = TempDir::new().unwrap();
        let src = HashFileDB::new(temp.path().join("old"));
        let dest = HashFileDB::new(temp.path().join("new")).with_hash_name("md5-dos2unix");
        src.add_bytes(CRLF, b"a\r\nb\r\n").unwrap();
        src.add_bytes(EMPTY_TREE, b"[]").unwrap();

        let migration = prepare(&src, &dest).unwrap();
        let mut oids: Vec<&str> = migration.objects.iter().map(|(_, oid)| oid.as_str()).collect();
        oids.sort();
        assert_eq!(oids, [EMPTY_TREE, LF]);

        assert_eq!(migrate(&migration).unwrap(), 2);
        assert!(dest.exists(LF));
        assert!(dest.exists(EMPTY_TREE));
        // Content is carried over unchanged, only the name moves
        assert_eq!(fs::read(dest.oid_to_path(LF)).unwrap(), b"a\r\nb\r\n");

        let inode = |p: &std::path::Path| fsutil::local_info(p).unwrap().ino;
        assert_eq!(inode(&dest.oid_to_path(LF)), inode(&src.oid_to_path(CRLF)));

        assert_eq!(migrate(&migration).unwrap(), 0);
    }

    #[test]
    fn empty_source() {
        let temp = TempDir::new().unwrap();
        let src = HashFileDB::new(temp.path().join("old"));
        let dest = HashFileDB::new(temp.path().join("new"));
        let migration = prepare(&src, &dest).unwrap();
        assert!(migration.objects.is_empty());
        assert_eq!(migrate(&migration).unwrap(), 0);
    }
}
