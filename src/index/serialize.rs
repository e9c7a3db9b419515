//! index::serialize
//!
//! Two on-disk forms of an index: a single JSON object keyed by path, and
//! a line-oriented database with one entry per line.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::data_index::{DataIndex, DataIndexEntry};
use super::{key_to_path, path_to_key, IndexError};
use crate::core::fsutil;

/// Entries present in `index`, without expanding directory trees.
fn present_entries(index: &DataIndex) -> Result<Vec<DataIndexEntry>, IndexError> {
    index.keys().iter().map(|k| index.get(k)).collect()
}

fn json_err(path: &Path, source: serde_json::Error) -> IndexError {
    IndexError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// Write `index` as `{"a/b": entry_dict, ...}`.
pub fn write_json(index: &DataIndex, path: &Path) -> Result<(), IndexError> {
    let mut doc = Map::new();
    for entry in present_entries(index)? {
        doc.insert(key_to_path(&entry.key), Value::Object(entry.to_dict()));
    }
    let bytes = serde_json::to_vec_pretty(&Value::Object(doc)).map_err(|e| json_err(path, e))?;
    fsutil::write_atomic(path, &bytes).map_err(|e| IndexError::io(path, e))
}

/// Read an index written by [`write_json`].
pub fn read_json(path: &Path) -> Result<DataIndex, IndexError> {
    let bytes = fs::read(path).map_err(|e| IndexError::io(path, e))?;
    let doc: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| json_err(path, e))?;

    let index = DataIndex::new();
    for (key, value) in doc {
        let Value::Object(d) = value else {
            return Err(IndexError::InvalidEntry {
                key,
                reason: "expected an object".into(),
            });
        };
        index.insert(path_to_key(&key), DataIndexEntry::from_dict(&d));
    }
    Ok(index)
}

#[derive(Debug, Serialize, Deserialize)]
struct DbRow {
    key: String,
    entry: Map<String, Value>,
}

/// Write `index` as a database file: one `{"key": ..., "entry": ...}` row
/// per line, in key order.
pub fn write_db(index: &DataIndex, path: &Path) -> Result<(), IndexError> {
    let mut buf = Vec::new();
    for entry in present_entries(index)? {
        let row = DbRow {
            key: key_to_path(&entry.key),
            entry: entry.to_dict(),
        };
        serde_json::to_writer(&mut buf, &row).map_err(|e| json_err(path, e))?;
        buf.push(b'\n');
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
    }
    fsutil::write_atomic(path, &buf).map_err(|e| IndexError::io(path, e))?;
    debug!("wrote {} index entries to '{}'", index.len(), path.display());
    Ok(())
}

/// Read a database written by [`write_db`]. Blank lines are skipped.
pub fn read_db(path: &Path) -> Result<DataIndex, IndexError> {
    let file = fs::File::open(path).map_err(|e| IndexError::io(path, e))?;
    let index = DataIndex::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| IndexError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let row: DbRow = serde_json::from_str(&line).map_err(|e| json_err(path, e))?;
        index.insert(path_to_key(&row.key), DataIndexEntry::from_dict(&row.entry));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash_info::HashInfo;
    use crate::core::meta::Meta;
    use tempfile::TempDir;

    fn sample() -> DataIndex {
        let index = DataIndex::new();
        index.insert(
            path_to_key("data"),
            DataIndexEntry::new(Vec::new(), Some(Meta::dir()), Some(HashInfo::new("md5", "1f69c66028c35037e8bf67e5bc4ceb6a.dir"))),
        );
        index.insert(
            path_to_key("data/foo"),
            DataIndexEntry::new(Vec::new(), Some(Meta::with_size(3)), Some(HashInfo::new("md5", "acbd18db4cc2f85cedef654fccc4a4d8"))),
        );
        index.insert(path_to_key("bare"), DataIndexEntry::default());
        index
    }

    fn assert_same(a: &DataIndex, b: &DataIndex) {
        assert_eq!(a.keys(), b.keys());
        for key in a.keys() {
            let (x, y) = (a.get(&key).unwrap(), b.get(&key).unwrap());
            assert_eq!(x.meta, y.meta);
            assert_eq!(x.hash_info, y.hash_info);
            assert_eq!(x.loaded, y.loaded);
        }
    }

    #[test]
    fn json_document_is_keyed_by_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.json");
        let index = sample();
        write_json(&index, &path).unwrap();

        let doc: Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(doc["data/foo"]["hash_info"]["md5"], "acbd18db4cc2f85cedef654fccc4a4d8");
        assert_eq!(doc["bare"]["loaded"], Value::Null);

        assert_same(&index, &read_json(&path).unwrap());
    }

    #[test]
    fn db_rows_are_read_back() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/index.db");
        let index = sample();
        write_db(&index, &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().next().unwrap().contains("\"key\":\"bare\""));

        assert_same(&index, &read_db(&path).unwrap());
    }

    #[test]
    fn malformed_input_is_reported() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("bad.db");
        fs::write(&db, "{not json}\n").unwrap();
        assert!(matches!(read_db(&db), Err(IndexError::Json { .. })));

        let json = temp.path().join("bad.json");
        fs::write(&json, r#"{"a": 1}"#).unwrap();
        assert!(matches!(read_json(&json), Err(IndexError::InvalidEntry { .. })));

        assert!(matches!(read_db(&temp.path().join("missing")), Err(IndexError::Io { .. })));
    }
}
