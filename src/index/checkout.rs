//! index::checkout
//!
//! Materialize a [`DataIndex`] at a workspace path.
//!
//! The index is diffed against `old`, the index that describes what is in
//! the workspace now (`None` for an empty workspace). Added and modified
//! files are linked from the cache of their storage with the first of its
//! `cache_types` that works. With `delete`, files that left the index are
//! removed as well; removing data that is not in the cache needs `force` or
//! a confirming prompt.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::data_index::{BaseDataIndex, DataIndex, DataIndexEntry};
use super::diff::{diff, Change, ChangeKind, DiffOptions};
use super::{IndexError, StorageMapping};
use crate::core::fsutil;
use crate::core::meta::Meta;
use crate::hashfile::checkout::{CheckoutError, Prompt};
use crate::hashfile::db::{HashFileDB, ObjectStore};
use crate::hashfile::link::{test_links, LinkType};

#[derive(Clone, Copy)]
pub struct IndexCheckoutOptions<'a> {
    /// What the workspace holds now.
    pub old: Option<&'a dyn BaseDataIndex>,
    /// Remove files that are in `old` but not in the new index.
    pub delete: bool,
    /// Remove uncached workspace data without asking.
    pub force: bool,
    /// Re-link unchanged entries too.
    pub relink: bool,
    /// Refresh entry meta from the linked files and point the storage
    /// mapping at the workspace.
    pub update_meta: bool,
    pub prompt: Option<Prompt<'a>>,
}

impl Default for IndexCheckoutOptions<'_> {
    fn default() -> Self {
        Self {
            old: None,
            delete: false,
            force: false,
            relink: false,
            update_meta: true,
            prompt: None,
        }
    }
}

/// Changes applied by [`checkout`], grouped by kind.
pub type CheckoutChanges = BTreeMap<ChangeKind, Vec<Change>>;

fn entry_path(path: &Path, key: &[String]) -> PathBuf {
    key.iter().fold(path.to_path_buf(), |acc, part| acc.join(part))
}

fn is_file(entry: &DataIndexEntry) -> bool {
    !entry.is_dir()
}

/// Check `index` out at `path`.
///
/// Entries whose object is missing from the cache do not stop the checkout;
/// they are reported together as [`CheckoutError::Failed`] once everything
/// else is in place.
pub fn checkout(
    index: &mut DataIndex,
    path: &Path,
    opts: &IndexCheckoutOptions<'_>,
) -> Result<CheckoutChanges, IndexError> {
    let diff_opts = DiffOptions {
        with_unchanged: opts.relink,
        ..DiffOptions::default()
    };
    let mut changes = CheckoutChanges::new();
    for change in diff(opts.old, Some(&*index), &diff_opts)? {
        changes.entry(change.typ).or_default().push(change);
    }
    let of_kind = |kinds: &[ChangeKind]| -> Vec<Change> {
        kinds
            .iter()
            .flat_map(|k| changes.get(k).cloned().unwrap_or_default())
            .collect()
    };

    let mut recreated = vec![ChangeKind::Add, ChangeKind::Modify];
    let mut replaced = vec![ChangeKind::Delete, ChangeKind::Modify];
    if opts.relink {
        recreated.push(ChangeKind::Unchanged);
        replaced.push(ChangeKind::Unchanged);
    }

    if opts.delete {
        let to_delete: Vec<DataIndexEntry> = of_kind(&replaced)
            .into_iter()
            .filter_map(|c| c.old)
            .filter(is_file)
            .collect();
        remove_entries(&index.storage_map, &to_delete, path, opts)?;
    }

    let create: Vec<DataIndexEntry> = of_kind(&recreated).into_iter().filter_map(|c| c.new).collect();
    let (created, failed) = create_entries(&index.storage_map, &create, path)?;
    debug!(
        "checked out {} entries at '{}', {} failed",
        created.len(),
        path.display(),
        failed.len()
    );

    if opts.update_meta {
        for (mut entry, dest) in created {
            entry.meta = Some(Meta::from_path(&dest).map_err(|e| IndexError::io(&dest, e))?);
            index.add(entry);
        }
        let updated: Vec<_> = index
            .storage_map
            .iter()
            .map(|(key, storage)| {
                let mut storage = storage.clone();
                storage.path = Some(entry_path(path, key));
                (key.clone(), storage)
            })
            .collect();
        for (key, storage) in updated {
            index.storage_map.add(key, storage);
        }
    }

    if !failed.is_empty() {
        return Err(CheckoutError::Failed(failed).into());
    }
    Ok(changes)
}

fn in_cache(storage_map: &StorageMapping, entry: &DataIndexEntry) -> bool {
    let Some(oid) = entry.hash_info.as_ref().and_then(|h| h.value()) else {
        return false;
    };
    storage_map
        .cache(&entry.key)
        .is_ok_and(|cache| cache.exists(oid))
}

fn remove_entries(
    storage_map: &StorageMapping,
    entries: &[DataIndexEntry],
    path: &Path,
    opts: &IndexCheckoutOptions<'_>,
) -> Result<(), IndexError> {
    let targets: Vec<PathBuf> = entries.iter().map(|e| entry_path(path, &e.key)).collect();
    if !opts.force {
        for (entry, target) in entries.iter().zip(&targets) {
            if in_cache(storage_map, entry) || fs::symlink_metadata(target).is_err() {
                continue;
            }
            let msg = format!(
                "file/directory '{}' is going to be removed. Are you sure you want to proceed?",
                target.display()
            );
            if !opts.prompt.is_some_and(|prompt| prompt(&msg)) {
                return Err(CheckoutError::Prompt(target.clone()).into());
            }
        }
    }
    for target in &targets {
        fsutil::remove(target).map_err(|e| IndexError::io(target, e))?;
    }
    Ok(())
}

type Created = Vec<(DataIndexEntry, PathBuf)>;

/// Link every file entry from its cache. Returns the linked entries with
/// their workspace paths, and the paths whose objects were missing.
fn create_entries(
    storage_map: &StorageMapping,
    entries: &[DataIndexEntry],
    path: &Path,
) -> Result<(Created, Vec<PathBuf>), IndexError> {
    let mut links: BTreeMap<PathBuf, Vec<LinkType>> = BTreeMap::new();
    let mut created = Vec::new();
    let mut failed = Vec::new();

    for entry in entries {
        let dest = entry_path(path, &entry.key);
        if entry.is_dir() {
            fs::create_dir_all(&dest).map_err(|e| IndexError::io(&dest, e))?;
            continue;
        }
        let Some(oid) = entry.hash_info.as_ref().and_then(|h| h.value()) else {
            debug!("'{}' has no hash, skipping", dest.display());
            continue;
        };
        let parent = dest.parent().unwrap_or(path);
        fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;

        let cache = storage_map.cache(&entry.key)?;
        let src = cache.oid_to_path(oid);
        if !src.exists() {
            debug!("cache object '{}' is missing", src.display());
            failed.push(dest);
            continue;
        }

        let types = links
            .entry(cache.path().to_path_buf())
            .or_insert_with(|| test_links(cache.cache_types(), cache.path(), parent));
        fsutil::remove(&dest).map_err(|e| IndexError::io(&dest, e))?;
        link(types, &cache, &src, &dest)?;
        created.push((entry.clone(), dest));
    }
    Ok((created, failed))
}

fn link(types: &[LinkType], cache: &Arc<HashFileDB>, from: &Path, to: &Path) -> Result<(), IndexError> {
    for typ in types {
        match typ.link(from, to) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CheckoutError::Failed(vec![to.to_path_buf()]).into());
            }
            Err(e) => debug!(link = %typ, error = %e, "link attempt failed"),
        }
    }
    debug!("no link type from '{}' works", cache.path().display());
    Err(CheckoutError::Link(to.to_path_buf()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash_info::HashInfo;
    use crate::hashfile::db::add_update_tree;
    use crate::hashfile::link::is_copy;
    use crate::hashfile::tree::Tree;
    use crate::index::{path_to_key, Storage};
    use std::cell::Cell;
    use tempfile::TempDir;

    const FOO: &str = "acbd18db4cc2f85cedef654fccc4a4d8";
    const BAR: &str = "37b51d194a7513e45b56f6524f2d51f2";
    const BAZ: &str = "73feffa4b7f6bb68e44cf984c85f6e88";

    /// Cache holding foo, bar and baz plus a tree {bar, baz}.
    fn cache(temp: &TempDir, types: Vec<LinkType>) -> (Arc<HashFileDB>, HashInfo) {
        let odb = HashFileDB::new(temp.path().join("cache")).with_cache_types(types);
        odb.add_bytes(FOO, b"foo").unwrap();
        odb.add_bytes(BAR, b"bar").unwrap();
        odb.add_bytes(BAZ, b"baz").unwrap();
        let mut tree = Tree::new();
        tree.add(path_to_key("bar"), Some(Meta::with_size(3)), HashInfo::new("md5", BAR));
        tree.add(path_to_key("baz"), Some(Meta::with_size(3)), HashInfo::new("md5", BAZ));
        tree.digest("md5").unwrap();
        add_update_tree(&odb, &mut tree).unwrap();
        (Arc::new(odb), tree.hash_info.unwrap())
    }

    fn file(oid: &str) -> DataIndexEntry {
        DataIndexEntry::new(Vec::new(), Some(Meta::default()), Some(HashInfo::new("md5", oid)))
    }

    fn index_of(cache: &Arc<HashFileDB>, entries: &[(&str, DataIndexEntry)]) -> DataIndex {
        let index = DataIndex::new().with_storage(Vec::new(), Storage::default().with_cache(cache.clone()));
        for (k, e) in entries {
            index.insert(path_to_key(k), e.clone());
        }
        index
    }

    #[test]
    fn checkout_files_and_trees() {
        let temp = TempDir::new().unwrap();
        let (cache, dir) = cache(&temp, vec![LinkType::Copy]);
        let dir_entry = DataIndexEntry::new(Vec::new(), Some(Meta::dir()), Some(dir));
        let mut index = index_of(&cache, &[("foo", file(FOO)), ("data", dir_entry)]);

        let ws = temp.path().join("ws");
        let changes = checkout(&mut index, &ws, &IndexCheckoutOptions::default()).unwrap();
        assert!(changes.contains_key(&ChangeKind::Add));

        assert_eq!(fs::read_to_string(ws.join("foo")).unwrap(), "foo");
        assert_eq!(fs::read_to_string(ws.join("data/bar")).unwrap(), "bar");
        assert_eq!(fs::read_to_string(ws.join("data/baz")).unwrap(), "baz");
        assert!(is_copy(&ws.join("foo")));
        let mut names: Vec<_> = fs::read_dir(&ws)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, ["data", "foo"]);
    }

    #[test]
    fn checkout_updates_meta_and_storage() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = cache(&temp, vec![LinkType::Copy]);
        let mut index = index_of(&cache, &[("foo", file(FOO))]);

        let ws = temp.path().join("ws");
        checkout(&mut index, &ws, &IndexCheckoutOptions::default()).unwrap();

        let entry = index.get(&path_to_key("foo")).unwrap();
        let meta = entry.meta.unwrap();
        assert_eq!(meta.size, Some(3));
        assert!(meta.inode.is_some());
        assert_eq!(index.storage_map.data_path(&path_to_key("foo")).unwrap(), ws.join("foo"));
    }

    #[test]
    fn modified_entries_are_replaced_and_deletes_need_the_flag() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = cache(&temp, vec![LinkType::Copy]);
        let ws = temp.path().join("ws");

        let mut old = index_of(&cache, &[("a", file(FOO)), ("b", file(BAR))]);
        checkout(&mut old, &ws, &IndexCheckoutOptions::default()).unwrap();

        let mut new = index_of(&cache, &[("a", file(BAZ))]);
        let opts = IndexCheckoutOptions {
            old: Some(&old),
            ..IndexCheckoutOptions::default()
        };
        checkout(&mut new, &ws, &opts).unwrap();
        assert_eq!(fs::read_to_string(ws.join("a")).unwrap(), "baz");
        assert!(ws.join("b").exists());

        let mut new = index_of(&cache, &[("a", file(BAZ))]);
        let opts = IndexCheckoutOptions {
            old: Some(&old),
            delete: true,
            ..IndexCheckoutOptions::default()
        };
        let changes = checkout(&mut new, &ws, &opts).unwrap();
        assert_eq!(changes[&ChangeKind::Delete].len(), 1);
        assert!(!ws.join("b").exists());
    }

    #[test]
    fn deleting_uncached_data_asks_first() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = cache(&temp, vec![LinkType::Copy]);
        let ws = temp.path().join("ws");
        fs::create_dir_all(&ws).unwrap();
        fs::write(ws.join("local"), "precious").unwrap();
        let unknown = "00000000000000000000000000000000";
        let old = index_of(&cache, &[("local", file(unknown))]);

        let opts = IndexCheckoutOptions {
            old: Some(&old),
            delete: true,
            ..IndexCheckoutOptions::default()
        };
        let err = checkout(&mut index_of(&cache, &[]), &ws, &opts).unwrap_err();
        assert!(matches!(err, IndexError::Checkout(CheckoutError::Prompt(_))));
        assert!(ws.join("local").exists());

        let asked = Cell::new(0);
        let yes = |_: &str| {
            asked.set(asked.get() + 1);
            true
        };
        let opts = IndexCheckoutOptions {
            prompt: Some(&yes),
            ..opts
        };
        checkout(&mut index_of(&cache, &[]), &ws, &opts).unwrap();
        assert_eq!(asked.get(), 1);
        assert!(!ws.join("local").exists());
    }

    #[test]
    fn relink_recreates_unchanged_entries() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = cache(&temp, vec![LinkType::Hardlink, LinkType::Copy]);
        let ws = temp.path().join("ws");
        let mut old = index_of(&cache, &[("foo", file(FOO))]);
        let keep_meta = IndexCheckoutOptions {
            update_meta: false,
            ..IndexCheckoutOptions::default()
        };
        checkout(&mut old, &ws, &keep_meta).unwrap();
        fs::remove_file(ws.join("foo")).unwrap();

        let mut new = index_of(&cache, &[("foo", file(FOO))]);
        let opts = IndexCheckoutOptions {
            old: Some(&old),
            ..IndexCheckoutOptions::default()
        };
        let changes = checkout(&mut new, &ws, &opts).unwrap();
        assert!(changes.is_empty());
        assert!(!ws.join("foo").exists());

        let opts = IndexCheckoutOptions {
            relink: true,
            ..opts
        };
        let changes = checkout(&mut new, &ws, &opts).unwrap();
        assert_eq!(changes[&ChangeKind::Unchanged].len(), 1);
        assert_eq!(fs::read_to_string(ws.join("foo")).unwrap(), "foo");
    }

    #[test]
    fn missing_objects_are_reported_after_the_rest() {
        let temp = TempDir::new().unwrap();
        let (cache, _) = cache(&temp, vec![LinkType::Copy]);
        let missing = "11111111111111111111111111111111";
        let mut index = index_of(&cache, &[("foo", file(FOO)), ("gone", file(missing))]);

        let ws = temp.path().join("ws");
        let err = checkout(&mut index, &ws, &IndexCheckoutOptions::default()).unwrap_err();
        match err {
            IndexError::Checkout(CheckoutError::Failed(paths)) => assert_eq!(paths, vec![ws.join("gone")]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(ws.join("foo").exists());
    }
}
