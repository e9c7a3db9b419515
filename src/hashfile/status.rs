//! hashfile::status
//!
//! Which objects exist in a store, and how two stores compare.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::db::{ObjectDbIndex, ObjectStore, OdbError};
use super::tree::Tree;
use crate::core::hash_info::HashInfo;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusResult {
    pub exists: BTreeSet<HashInfo>,
    pub missing: BTreeSet<HashInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompareStatusResult {
    /// In both stores.
    pub ok: BTreeSet<HashInfo>,
    /// In neither store.
    pub missing: BTreeSet<HashInfo>,
    /// Only in the source.
    pub new: BTreeSet<HashInfo>,
    /// Only in the destination.
    pub deleted: BTreeSet<HashInfo>,
}

#[derive(Clone, Copy)]
pub struct StatusOptions<'a> {
    /// Check tree objects only, not their entries.
    pub shallow: bool,
    pub index: Option<&'a dyn ObjectDbIndex>,
    /// Where trees are loaded from; defaults to the store being queried.
    pub cache_odb: Option<&'a dyn ObjectStore>,
}

impl Default for StatusOptions<'_> {
    fn default() -> Self {
        Self {
            shallow: true,
            index: None,
            cache_odb: None,
        }
    }
}

/// File and tree oids known to exist through trees present in `odb`.
fn indexed_dir_hashes(
    odb: &dyn ObjectStore,
    index: &dyn ObjectDbIndex,
    dir_objs: &BTreeMap<String, Option<Tree>>,
    name: &str,
    cache_odb: &dyn ObjectStore,
) -> Result<BTreeSet<String>, OdbError> {
    // Every indexed tree must still be present, otherwise the index is stale
    let indexed_dirs: BTreeSet<String> = index.dir_hashes().into_iter().collect();
    let mut indexed_dir_exists = BTreeSet::new();
    if !indexed_dirs.is_empty() {
        indexed_dir_exists = odb.oids_exist(&indexed_dirs);
        let missing: Vec<&String> = indexed_dirs.difference(&indexed_dir_exists).collect();
        if !missing.is_empty() {
            debug!(
                "Remote cache missing indexed .dir hashes '{}', clearing remote index",
                missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
            );
            index.clear()?;
        }
    }

    let dir_hashes: BTreeSet<String> = dir_objs.keys().cloned().collect();
    let mut dir_exists: BTreeSet<String> =
        dir_hashes.intersection(&indexed_dir_exists).cloned().collect();
    let dir_missing: BTreeSet<String> = dir_hashes.difference(&dir_exists).cloned().collect();
    dir_exists.extend(odb.oids_exist(&dir_missing));

    let mut ret = BTreeSet::new();
    for dir_hash in dir_exists {
        let loaded;
        let tree = match dir_objs.get(&dir_hash) {
            Some(Some(tree)) => tree,
            _ => match Tree::load(cache_odb, &HashInfo::new(name, dir_hash.as_str())) {
                Ok(tree) => {
                    loaded = tree;
                    &loaded
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            },
        };
        let file_hashes: Vec<String> = tree
            .iter()
            .filter_map(|(_, _, hi)| hi.value().map(String::from))
            .collect();
        if !index.contains(&dir_hash) {
            debug!(
                "Indexing new .dir '{}' with '{}' nested files",
                dir_hash,
                file_hashes.len()
            );
            index.update(std::slice::from_ref(&dir_hash), &file_hashes)?;
        }
        ret.extend(file_hashes);
        ret.insert(dir_hash);
    }
    Ok(ret)
}

/// Split `obj_ids` into those present in `odb` and those missing.
///
/// Unless `shallow`, trees are expanded and their entries checked too.
/// Staging stores report everything as present.
pub fn status(
    odb: &dyn ObjectStore,
    obj_ids: &BTreeSet<HashInfo>,
    opts: &StatusOptions<'_>,
) -> Result<StatusResult, OdbError> {
    debug!("Preparing to collect status from '{}'", odb.location());
    let name = odb.hash_name().to_string();
    let cache_odb = opts.cache_odb.unwrap_or(odb);

    let mut hash_infos: BTreeMap<String, HashInfo> = BTreeMap::new();
    let mut dir_objs: BTreeMap<String, Option<Tree>> = BTreeMap::new();
    for hash_info in obj_ids {
        let Some(value) = hash_info.value() else {
            continue;
        };
        if hash_info.is_dir() {
            let tree = if opts.shallow {
                None
            } else {
                let tree = Tree::load(cache_odb, hash_info)?;
                for (_, _, entry) in tree.iter() {
                    if let Some(v) = entry.value() {
                        hash_infos.insert(v.to_string(), entry.clone());
                    }
                }
                Some(tree)
            };
            if opts.index.is_some() {
                dir_objs.insert(value.to_string(), tree);
            }
        }
        hash_infos.insert(value.to_string(), hash_info.clone());
    }

    if odb.is_staging() {
        return Ok(StatusResult {
            exists: hash_infos.into_values().collect(),
            missing: BTreeSet::new(),
        });
    }

    let mut hashes: BTreeSet<String> = hash_infos.keys().cloned().collect();
    let mut exists: BTreeSet<String> = BTreeSet::new();

    debug!("Collecting status from '{}'", odb.location());
    if let Some(index) = opts.index {
        if !hashes.is_empty() {
            if !dir_objs.is_empty() {
                let indexed = indexed_dir_hashes(odb, index, &dir_objs, &name, cache_odb)?;
                exists = hashes.intersection(&indexed).cloned().collect();
                hashes.retain(|h| !exists.contains(h));
            }
            if !hashes.is_empty() {
                exists.extend(index.intersection(&hashes));
                hashes.retain(|h| !exists.contains(h));
            }
        }
    }

    if !hashes.is_empty() {
        exists.extend(odb.oids_exist(&hashes));
    }

    let mut ret = StatusResult::default();
    for (oid, hash_info) in hash_infos {
        if exists.contains(&oid) {
            ret.exists.insert(hash_info);
        } else if hashes.contains(&oid) {
            ret.missing.insert(hash_info);
        }
    }
    Ok(ret)
}

#[derive(Clone, Copy, Default)]
pub struct CompareOptions<'a> {
    /// Also compute `deleted`, which requires a full source status.
    pub check_deleted: bool,
    pub shallow: bool,
    pub src_index: Option<&'a dyn ObjectDbIndex>,
    pub dest_index: Option<&'a dyn ObjectDbIndex>,
    pub cache_odb: Option<&'a dyn ObjectStore>,
}

/// Compare the presence of `obj_ids` in `src` and `dest`.
pub fn compare_status(
    src: &dyn ObjectStore,
    dest: &dyn ObjectStore,
    obj_ids: &BTreeSet<HashInfo>,
    opts: &CompareOptions<'_>,
) -> Result<CompareStatusResult, OdbError> {
    let cache_odb = opts.cache_odb.unwrap_or(src);
    let dest_status = status(
        dest,
        obj_ids,
        &StatusOptions {
            shallow: opts.shallow,
            index: opts.dest_index,
            cache_odb: Some(cache_odb),
        },
    )?;

    // Nothing to learn from the source when the destination has everything
    let src_status = if !dest_status.missing.is_empty() || opts.check_deleted {
        status(
            src,
            obj_ids,
            &StatusOptions {
                shallow: opts.shallow,
                index: opts.src_index,
                cache_odb: None,
            },
        )?
    } else {
        StatusResult {
            exists: dest_status.exists.clone(),
            missing: BTreeSet::new(),
        }
    };

    let (src_exists, dest_exists) = (&src_status.exists, &dest_status.exists);
    Ok(CompareStatusResult {
        ok: src_exists.intersection(dest_exists).cloned().collect(),
        missing: src_status
            .missing
            .intersection(&dest_status.missing)
            .cloned()
            .collect(),
        new: src_exists.difference(dest_exists).cloned().collect(),
        deleted: dest_exists.difference(src_exists).cloned().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashfile::db::{add_update_tree, HashFileDB, JsonObjectDbIndex, ReferenceDB};
    use tempfile::TempDir;

    const FOO: &str = "acbd18db4cc2f85cedef654fccc4a4d8";
    const BAR: &str = "37b51d194a7513e45b56f6524f2d51f2";

    fn ids(values: &[&str]) -> BTreeSet<HashInfo> {
        values.iter().map(|v| HashInfo::new("md5", *v)).collect()
    }

    fn stored_tree(odb: &HashFileDB) -> HashInfo {
        let mut tree = Tree::new();
        tree.add(vec!["foo".into()], None, HashInfo::new("md5", FOO));
        tree.add(vec!["bar".into()], None, HashInfo::new("md5", BAR));
        tree.digest("md5").unwrap();
        add_update_tree(odb, &mut tree).unwrap();
        tree.hash_info.unwrap()
    }

    #[test]
    fn status_splits_exists_and_missing() {
        let temp = TempDir::new().unwrap();
        let odb = HashFileDB::new(temp.path().join("cache"));
        odb.add_bytes(FOO, b"foo").unwrap();

        let res = status(&odb, &ids(&[FOO, BAR]), &StatusOptions::default()).unwrap();
        assert_eq!(res.exists, ids(&[FOO]));
        assert_eq!(res.missing, ids(&[BAR]));
    }

    #[test]
    fn deep_status_expands_trees() {
        let temp = TempDir::new().unwrap();
        let odb = HashFileDB::new(temp.path().join("cache"));
        let dir = stored_tree(&odb);
        odb.add_bytes(FOO, b"foo").unwrap();

        let shallow = status(&odb, &[dir.clone()].into(), &StatusOptions::default()).unwrap();
        assert_eq!(shallow.exists.len(), 1);

        let opts = StatusOptions {
            shallow: false,
            ..StatusOptions::default()
        };
        let deep = status(&odb, &[dir].into(), &opts).unwrap();
        assert_eq!(deep.exists.len(), 2);
        assert_eq!(deep.missing, ids(&[BAR]));
    }

    #[test]
    fn index_trusts_present_trees() {
        let temp = TempDir::new().unwrap();
        let odb = HashFileDB::new(temp.path().join("cache"));
        let dir = stored_tree(&odb);
        let index = JsonObjectDbIndex::open(&temp.path().join("tmp"), "remote");

        let opts = StatusOptions {
            shallow: false,
            index: Some(&index),
            cache_odb: None,
        };
        // Entries are assumed present once their tree is
        let res = status(&odb, &[dir.clone()].into(), &opts).unwrap();
        assert_eq!(res.exists.len(), 3);
        assert!(index.contains(dir.value().unwrap()));
        assert!(index.contains(FOO));

        // Losing the tree clears the stale index
        odb.delete(dir.value().unwrap()).unwrap();
        let res = status(&odb, &ids(&[FOO]), &opts).unwrap();
        assert!(res.exists.contains(&HashInfo::new("md5", FOO)));
        let cache_opts = StatusOptions {
            cache_odb: Some(&odb),
            ..opts
        };
        let res = status(&odb, &[dir].into(), &cache_opts);
        assert!(res.unwrap_err().is_not_found());
    }

    #[test]
    fn staging_reports_everything_present() {
        let staging = ReferenceDB::new("md5");
        let res = status(&staging, &ids(&[FOO]), &StatusOptions::default()).unwrap();
        assert_eq!(res.exists, ids(&[FOO]));
        assert!(res.missing.is_empty());
    }

    #[test]
    fn compare_classifies_objects() {
        let temp = TempDir::new().unwrap();
        let src = HashFileDB::new(temp.path().join("src"));
        let dest = HashFileDB::new(temp.path().join("dest"));
        let baz = "73feffa4b7f6bb68e44cf984c85f6e88";
        src.add_bytes(FOO, b"foo").unwrap();
        dest.add_bytes(BAR, b"bar").unwrap();

        let opts = CompareOptions {
            check_deleted: true,
            shallow: true,
            ..CompareOptions::default()
        };
        let res = compare_status(&src, &dest, &ids(&[FOO, BAR, baz]), &opts).unwrap();
        assert_eq!(res.new, ids(&[FOO]));
        assert_eq!(res.deleted, ids(&[BAR]));
        assert_eq!(res.missing, ids(&[baz]));
        assert!(res.ok.is_empty());
    }

    #[test]
    fn compare_skips_source_when_dest_is_complete() {
        let temp = TempDir::new().unwrap();
        let src = HashFileDB::new(temp.path().join("src"));
        let dest = HashFileDB::new(temp.path().join("dest"));
        dest.add_bytes(FOO, b"foo").unwrap();

        let res = compare_status(&src, &dest, &ids(&[FOO]), &CompareOptions::default()).unwrap();
        assert_eq!(res.ok, ids(&[FOO]));
        assert!(res.new.is_empty());
    }
}
