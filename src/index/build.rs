//! index::build
//!
//! Index workspace paths by their filesystem metadata.

use std::path::Path;

use super::data_index::{DataIndex, DataIndexEntry, Storage};
use super::diff::{diff, ChangeKind, DiffOptions};
use super::{DataIndexKey, IndexError};
use crate::core::meta::Meta;
use crate::hashfile::ignore::{self, Ignore};

/// Entry for a single path, meta only.
pub fn build_entry(path: &Path) -> Result<DataIndexEntry, IndexError> {
    let meta = Meta::from_path(path).map_err(|e| IndexError::io(path, e))?;
    Ok(DataIndexEntry::new(Vec::new(), Some(meta), None))
}

/// Entries for every directory and file below `path`, keyed relative to it.
fn build_entries(
    path: &Path,
    ignore: Option<&dyn Ignore>,
) -> Result<Vec<(DataIndexKey, DataIndexEntry)>, IndexError> {
    let levels = ignore::walk(path, ignore).map_err(|e| IndexError::io(path, e))?;
    let mut ret = Vec::new();
    for level in levels {
        let root_key: DataIndexKey = level
            .root
            .strip_prefix(path)
            .unwrap_or(Path::new(""))
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        for name in level.dirs.iter().chain(&level.files) {
            let mut key = root_key.clone();
            key.push(name.clone());
            let mut entry = build_entry(&level.root.join(name))?;
            entry.key = key.clone();
            ret.push((key, entry));
        }
    }
    Ok(ret)
}

/// Index the contents of the directory at `path`. The index's root storage
/// points at `path`.
pub fn build(path: &Path, ignore: Option<&dyn Ignore>) -> Result<DataIndex, IndexError> {
    let index = DataIndex::new().with_storage(Vec::new(), Storage::data(path));
    for (key, entry) in build_entries(path, ignore)? {
        index.insert(key, entry);
    }
    Ok(index)
}

/// Add `path` to `index` under `key`: a single entry for a file, one entry
/// per directory and file for a directory.
pub fn add(
    index: &mut DataIndex,
    path: &Path,
    key: DataIndexKey,
    ignore: Option<&dyn Ignore>,
) -> Result<(), IndexError> {
    index.storage_map.add(key.clone(), Storage::data(path));
    if !path.is_dir() {
        index.insert(key, build_entry(path)?);
        return Ok(());
    }
    for (entry_key, entry) in build_entries(path, ignore)? {
        let full: DataIndexKey = key.iter().chain(&entry_key).cloned().collect();
        index.insert(full, entry);
    }
    Ok(())
}

/// Carry hashes from `old` to entries of `new` whose meta did not change.
pub fn update(new: &DataIndex, old: &DataIndex) -> Result<(), IndexError> {
    let opts = DiffOptions {
        with_unchanged: true,
        meta_only: true,
        ..DiffOptions::default()
    };
    for change in diff(Some(old), Some(new), &opts)? {
        if change.typ != ChangeKind::Unchanged {
            continue;
        }
        if let (Some(old_entry), Some(mut new_entry)) = (change.old, change.new) {
            new_entry.hash_info = old_entry.hash_info;
            new.insert(new_entry.key.clone(), new_entry);
        }
    }
    Ok(())
}
