//! hashfile::gc
//!
//! Remove every object not reachable from a set of used objects.

use std::collections::BTreeSet;

use tracing::debug;

use super::db::{HashFileDB, ObjectStore, OdbError};
use super::tree::Tree;
use crate::core::fsutil;
use crate::core::hash_info::{HashInfo, HASH_DIR_SUFFIX};

/// Delete unused objects from `odb`. Returns whether anything was removed.
///
/// Unless `shallow`, the entries of used trees (loaded from `cache_odb`,
/// or `odb`) are kept as well.
pub fn gc(
    odb: &HashFileDB,
    used: &BTreeSet<HashInfo>,
    cache_odb: Option<&dyn ObjectStore>,
    shallow: bool,
) -> Result<bool, OdbError> {
    if odb.read_only() {
        return Err(OdbError::ReadOnly {
            op: "gc",
            path: odb.path().to_path_buf(),
        });
    }
    let cache_odb: &dyn ObjectStore = cache_odb.unwrap_or(odb);

    let mut used_hashes = BTreeSet::new();
    for hash_info in used {
        let Some(value) = hash_info.value() else {
            continue;
        };
        used_hashes.insert(value.to_string());
        if hash_info.is_dir() && !shallow {
            let tree = Tree::load(cache_odb, hash_info)?;
            used_hashes.extend(tree.iter().filter_map(|(_, _, hi)| hi.value().map(String::from)));
        }
    }

    let mut dir_paths = Vec::new();
    let mut file_paths = Vec::new();
    for oid in odb.all()? {
        if used_hashes.contains(&oid) {
            continue;
        }
        let path = odb.oid_to_path(&oid);
        if oid.ends_with(HASH_DIR_SUFFIX) {
            odb.remove_unpacked_dir(&oid)?;
            dir_paths.push(path);
        } else {
            file_paths.push(path);
        }
    }

    let mut removed = false;
    for paths in [dir_paths, file_paths] {
        for path in paths {
            debug!("Removing '{}'", path.display());
            fsutil::remove(&path).map_err(|e| OdbError::io(&path, e))?;
            removed = true;
        }
    }
    Ok(removed)
}
