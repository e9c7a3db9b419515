//! index::save
//!
//! Hash index entries and store their data.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use tracing::debug;

use super::data_index::{DataIndex, DataIndexEntry};
use super::{DataIndexKey, IndexError};
use crate::core::meta::Meta;
use crate::hashfile::db::{add_update_tree, HashFileDB, ObjectStore};
use crate::hashfile::hash::{hash_file, HashError};
use crate::hashfile::state::StateBase;
use crate::hashfile::tree::tree_from_index;

/// Hash every file entry that has no md5-family hash yet.
///
/// With `check_meta`, entries whose file changed since it was indexed (or
/// disappeared) are left alone.
pub fn md5(
    index: &DataIndex,
    state: Option<&dyn StateBase>,
    name: &str,
    check_meta: bool,
) -> Result<(), IndexError> {
    let mut entries: BTreeMap<DataIndexKey, DataIndexEntry> = BTreeMap::new();

    for (key, entry) in index.iteritems(None, false)? {
        if entry.is_dir() {
            continue;
        }
        let hashed = entry
            .hash_info
            .as_ref()
            .and_then(|h| h.name())
            .is_some_and(|n| n == "md5" || n == "md5-dos2unix");
        if hashed {
            continue;
        }

        let path = index.storage_map.data_path(&key)?;
        if check_meta {
            let meta = match Meta::from_path(&path) {
                Ok(meta) => meta,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(IndexError::io(&path, e)),
            };
            if entry.meta.as_ref() != Some(&meta) {
                debug!("'{}' changed since it was indexed", path.display());
                continue;
            }
        }

        let (_, hash_info) = hash_file(&path, name, state).map_err(|e| match e {
            HashError::Io(e) => IndexError::io(&path, e),
            other => other.into(),
        })?;
        if let Some(state) = state {
            state.save(&path, &hash_info, None);
        }
        entries.insert(
            key,
            DataIndexEntry::new(entry.key.clone(), entry.meta.clone(), Some(hash_info)),
        );
    }

    for (key, entry) in entries {
        index.insert(key, entry);
    }
    Ok(())
}

/// Store a directory entry's tree and give the entry its hash and meta.
fn save_dir_entry(
    index: &DataIndex,
    key: &[String],
    odb: Option<&HashFileDB>,
) -> Result<(), IndexError> {
    let owned: Arc<HashFileDB>;
    let cache = match odb {
        Some(odb) => odb,
        None => match index.storage_map.cache(key) {
            Ok(cache) => {
                owned = cache;
                owned.as_ref()
            }
            Err(IndexError::NoStorage(_)) => return Ok(()),
            Err(e) => return Err(e),
        },
    };

    let mut entry = index.get(key)?;
    let (mut meta, mut tree) = tree_from_index(index, key)?;
    tree.digest(cache.hash_name())?;
    add_update_tree(cache, &mut tree)?;
    if let Some(hash_info) = tree.hash_info.clone() {
        if hash_info.name() == Some(Meta::PARAM_MD5) {
            meta.md5 = hash_info.value().map(String::from);
        }
        entry.hash_info = Some(hash_info);
    }
    entry.meta = Some(meta);
    // The entries below are already present
    entry.loaded = Some(true);
    index.insert(key.to_vec(), entry);
    Ok(())
}

/// Store the data of every hashed file entry, then a tree for every
/// directory entry. Returns the number of objects written.
pub fn save(index: &DataIndex, odb: Option<&HashFileDB>) -> Result<usize, IndexError> {
    let mut dir_entries = Vec::new();
    let mut transferred = 0;

    for (key, entry) in index.iteritems(None, false)? {
        if entry.is_dir() {
            dir_entries.push(key);
            continue;
        }
        let Some(oid) = entry.hash_info.as_ref().and_then(|h| h.value()) else {
            continue;
        };
        let path = index.storage_map.data_path(&key)?;
        let written = match odb {
            Some(odb) => odb.add(&path, oid, false)?,
            None => index.storage_map.cache(&key)?.add(&path, oid, false)?,
        };
        if written {
            transferred += 1;
        }
    }

    for key in dir_entries {
        save_dir_entry(index, &key, odb)?;
    }
    Ok(transferred)
}
