//! index::data_index
//!
//! Entries, storage locations and the lazily expanded [`DataIndex`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::{key_to_path, DataIndexKey, IndexError};
use crate::core::hash_info::HashInfo;
use crate::core::meta::Meta;
use crate::hashfile::db::{HashFileDB, ObjectStore, OdbError};
use crate::hashfile::transfer::{transfer as transfer_objects, TransferOptions, TransferResult};
use crate::hashfile::tree::Tree;

/// One file or directory in the index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataIndexEntry {
    pub key: DataIndexKey,
    pub meta: Option<Meta>,
    pub hash_info: Option<HashInfo>,
    /// `Some(true)` once a directory entry's tree has been expanded.
    pub loaded: Option<bool>,
}

impl DataIndexEntry {
    pub fn new(key: DataIndexKey, meta: Option<Meta>, hash_info: Option<HashInfo>) -> Self {
        Self {
            key,
            meta,
            hash_info,
            loaded: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.meta.as_ref().is_some_and(|m| m.isdir)
    }

    /// A directory whose contents come from a stored tree.
    fn is_expandable(&self) -> bool {
        self.loaded != Some(true)
            && self.hash_info.as_ref().is_some_and(|h| !h.is_empty())
            && (self.hash_info.as_ref().is_some_and(HashInfo::is_dir) || self.is_dir())
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        let mut ret = Map::new();
        if let Some(meta) = &self.meta {
            ret.insert("meta".into(), Value::Object(meta.to_dict()));
        }
        if let Some(hash_info) = self.hash_info.as_ref().filter(|h| !h.is_empty()) {
            ret.insert("hash_info".into(), Value::Object(hash_info.to_dict()));
        }
        ret.insert(
            "loaded".into(),
            self.loaded.map_or(Value::Null, Value::Bool),
        );
        ret
    }

    /// Parse an entry written by [`DataIndexEntry::to_dict`]. The key is
    /// not part of the dict.
    pub fn from_dict(d: &Map<String, Value>) -> Self {
        Self {
            key: Vec::new(),
            meta: d.get("meta").and_then(Value::as_object).map(Meta::from_dict),
            hash_info: d
                .get("hash_info")
                .and_then(Value::as_object)
                .map(HashInfo::from_dict)
                .filter(|h| !h.is_empty()),
            loaded: d.get("loaded").and_then(Value::as_bool),
        }
    }
}

/// Where the contents of a part of the index can be found.
#[derive(Clone, Default)]
pub struct Storage {
    /// Workspace location of the data.
    pub path: Option<PathBuf>,
    /// Object store the entries were built into, often a staging store.
    pub odb: Option<Arc<dyn ObjectStore>>,
    pub cache: Option<Arc<HashFileDB>>,
    pub remote: Option<Arc<HashFileDB>>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.path)
            .field("odb", &self.odb.as_ref().map(|o| o.location()))
            .field("cache", &self.cache.as_ref().map(|o| o.location()))
            .field("remote", &self.remote.as_ref().map(|o| o.location()))
            .finish()
    }
}

impl Storage {
    /// Storage for workspace data at `path`.
    pub fn data(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_cache(mut self, cache: Arc<HashFileDB>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_remote(mut self, remote: Arc<HashFileDB>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_odb(mut self, odb: Arc<dyn ObjectStore>) -> Self {
        self.odb = Some(odb);
        self
    }

    fn stores(&self) -> Vec<Arc<dyn ObjectStore>> {
        let mut ret: Vec<Arc<dyn ObjectStore>> = Vec::new();
        ret.extend(self.odb.clone());
        ret.extend(self.cache.clone().map(|c| c as Arc<dyn ObjectStore>));
        ret.extend(self.remote.clone().map(|r| r as Arc<dyn ObjectStore>));
        ret
    }
}

/// Key prefix to storage. A lookup uses the longest matching prefix and
/// extends its `path` with the rest of the key.
#[derive(Debug, Clone, Default)]
pub struct StorageMapping {
    map: BTreeMap<DataIndexKey, Storage>,
}

impl StorageMapping {
    pub fn add(&mut self, prefix: DataIndexKey, storage: Storage) {
        self.map.insert(prefix, storage);
    }

    pub fn remove(&mut self, prefix: &[String]) -> Option<Storage> {
        self.map.remove(prefix)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DataIndexKey, &Storage)> {
        self.map.iter()
    }

    pub fn get(&self, key: &[String]) -> Option<Storage> {
        let (prefix, storage) = (0..=key.len())
            .rev()
            .find_map(|i| self.map.get_key_value(&key[..i]))?;
        let mut storage = storage.clone();
        if let Some(path) = storage.path.as_mut() {
            for part in &key[prefix.len()..] {
                path.push(part);
            }
        }
        Some(storage)
    }

    /// Workspace path of `key`.
    pub fn data_path(&self, key: &[String]) -> Result<PathBuf, IndexError> {
        self.get(key)
            .and_then(|s| s.path)
            .ok_or_else(|| IndexError::NoStorage(key_to_path(key)))
    }

    /// Cache database responsible for `key`.
    pub fn cache(&self, key: &[String]) -> Result<Arc<HashFileDB>, IndexError> {
        self.get(key)
            .and_then(|s| s.cache)
            .ok_or_else(|| IndexError::NoStorage(key_to_path(key)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::File => "file",
            EntryType::Directory => "directory",
        }
    }
}

/// Filesystem-style description of an index node.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    pub typ: EntryType,
    pub size: Option<u64>,
    pub isexec: bool,
    /// Tracked by the index, directly or through an ancestor.
    pub isdvc: bool,
    /// Has an entry of its own.
    pub isout: bool,
    pub entry: Option<DataIndexEntry>,
}

impl EntryInfo {
    pub fn is_dir(&self) -> bool {
        self.typ == EntryType::Directory
    }

    /// `(name, value)` of the entry's hash.
    pub fn hash(&self) -> Option<(&str, &str)> {
        let hash_info = self.entry.as_ref()?.hash_info.as_ref()?;
        Some((hash_info.name()?, hash_info.value()?))
    }
}

/// Read access shared by indexes and views.
pub trait BaseDataIndex {
    /// Entry at `key`, expanding directory trees on the way.
    fn get(&self, key: &[String]) -> Result<DataIndexEntry, IndexError>;

    /// Entries at or below `prefix` in key order. With `shallow`, nothing
    /// below an entry is returned.
    fn iteritems(
        &self,
        prefix: Option<&[String]>,
        shallow: bool,
    ) -> Result<Vec<(DataIndexKey, DataIndexEntry)>, IndexError>;

    /// Immediate children of `key`.
    fn ls(&self, key: &[String]) -> Result<Vec<(DataIndexKey, EntryInfo)>, IndexError>;

    /// True when `key` has an entry or anything below it.
    fn has_node(&self, key: &[String]) -> bool;

    /// Deepest entry at or above `key`.
    fn longest_prefix(&self, key: &[String]) -> Option<(DataIndexKey, DataIndexEntry)>;

    fn info_from_entry(&self, key: &[String], entry: Option<DataIndexEntry>) -> EntryInfo {
        let Some(entry) = entry else {
            return EntryInfo {
                typ: EntryType::Directory,
                size: Some(0),
                isexec: false,
                isdvc: self.longest_prefix(key).is_some(),
                isout: false,
                entry: None,
            };
        };
        let meta = entry.meta.as_ref();
        EntryInfo {
            typ: if entry.is_dir() {
                EntryType::Directory
            } else {
                EntryType::File
            },
            size: meta.map_or(Some(0), |m| m.size),
            isexec: meta.is_some_and(|m| m.isexec),
            isdvc: true,
            isout: true,
            entry: Some(entry),
        }
    }

    /// Info for `key`; prefixes without an entry are directories.
    fn info(&self, key: &[String]) -> Result<EntryInfo, IndexError> {
        match self.get(key) {
            Ok(entry) => Ok(self.info_from_entry(key, Some(entry))),
            Err(IndexError::ShortKey(_)) => Ok(self.info_from_entry(key, None)),
            Err(e) => Err(e),
        }
    }
}

/// Key-ordered index of entries with lazily expanded directories.
#[derive(Debug, Default)]
pub struct DataIndex {
    entries: RefCell<BTreeMap<DataIndexKey, DataIndexEntry>>,
    pub storage_map: StorageMapping,
}

/// Keys of `map` at or below `prefix`, in order.
fn keys_below<'a, V>(
    map: &'a BTreeMap<DataIndexKey, V>,
    prefix: &'a [String],
) -> impl Iterator<Item = (&'a DataIndexKey, &'a V)> + 'a {
    map.range(prefix.to_vec()..)
        .take_while(move |(k, _)| k.starts_with(prefix))
}

fn try_load(stores: &[Arc<dyn ObjectStore>], hash_info: &HashInfo) -> Result<Option<Tree>, OdbError> {
    for odb in stores {
        match Tree::load(odb.as_ref(), hash_info) {
            Ok(tree) => return Ok(Some(tree)),
            Err(e) if e.is_not_found() || matches!(e, OdbError::Corrupted(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

impl DataIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_storage(mut self, prefix: DataIndexKey, storage: Storage) -> Self {
        self.storage_map.add(prefix, storage);
        self
    }

    /// Store `entry` under `key`.
    pub fn insert(&self, key: DataIndexKey, mut entry: DataIndexEntry) {
        entry.key = key.clone();
        self.entries.borrow_mut().insert(key, entry);
    }

    /// Store `entry` under its own key.
    pub fn add(&self, entry: DataIndexEntry) {
        self.insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, key: &[String]) -> Option<DataIndexEntry> {
        self.entries.borrow_mut().remove(key)
    }

    pub fn contains_key(&self, key: &[String]) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Number of entries currently present (expanded trees included).
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Present keys, without expanding anything.
    pub fn keys(&self) -> Vec<DataIndexKey> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Expand the tree of the directory entry at `key`, if it has one that
    /// can be found in its storage.
    fn load_entry(&self, key: &[String]) -> Result<(), IndexError> {
        let Some(mut entry) = self.entries.borrow().get(key).cloned() else {
            return Ok(());
        };
        if !entry.is_expandable() {
            return Ok(());
        }
        let Some(hash_info) = entry.hash_info.clone() else {
            return Ok(());
        };
        let Some(storage) = self.storage_map.get(key) else {
            return Ok(());
        };
        let Some(tree) = try_load(&storage.stores(), &hash_info)? else {
            debug!("tree '{}' of '{}' is not available", hash_info, key_to_path(key));
            return Ok(());
        };

        let mut dirs: BTreeSet<DataIndexKey> = BTreeSet::new();
        let mut entries = self.entries.borrow_mut();
        for (ikey, meta, child_hash) in tree.iter() {
            let meta = match meta {
                None if *child_hash == hash_info => entry.meta.clone(),
                other => other.clone(),
            };
            // Trees only list files, so intermediate directories get
            // entries of their own
            for depth in 1..ikey.len() {
                dirs.insert(ikey[..depth].to_vec());
            }
            let child_key: DataIndexKey = key.iter().chain(ikey).cloned().collect();
            entries.insert(
                child_key.clone(),
                DataIndexEntry::new(child_key, meta, Some(child_hash.clone())),
            );
        }
        for dkey in dirs {
            let child_key: DataIndexKey = key.iter().chain(&dkey).cloned().collect();
            let meta = Meta {
                isdir: true,
                ..Meta::default()
            };
            entries.insert(child_key.clone(), DataIndexEntry::new(child_key, Some(meta), None));
        }

        entry.loaded = Some(true);
        entries.insert(key.to_vec(), entry);
        Ok(())
    }

    /// Expand every directory entry reachable without descending into
    /// other entries.
    pub fn load(&self) -> Result<(), IndexError> {
        for (key, _) in self.collect(&[], true) {
            self.load_entry(&key)?;
        }
        Ok(())
    }

    fn collect(&self, prefix: &[String], shallow: bool) -> Vec<(DataIndexKey, DataIndexEntry)> {
        let entries = self.entries.borrow();
        let mut ret: Vec<(DataIndexKey, DataIndexEntry)> = Vec::new();
        for (key, entry) in keys_below(&entries, prefix) {
            if shallow && ret.last().is_some_and(|(last, _)| key.starts_with(last)) {
                continue;
            }
            ret.push((key.clone(), entry.clone()));
        }
        ret
    }

    pub fn get(&self, key: &[String]) -> Result<DataIndexEntry, IndexError> {
        if let Some(entry) = self.entries.borrow().get(key) {
            return Ok(entry.clone());
        }
        if let Some((dir_key, _)) = self.longest_prefix(key) {
            self.load_entry(&dir_key)?;
        }
        if let Some(entry) = self.entries.borrow().get(key) {
            return Ok(entry.clone());
        }
        if self.has_node(key) {
            return Err(IndexError::ShortKey(key_to_path(key)));
        }
        Err(IndexError::KeyNotFound(key_to_path(key)))
    }

    pub fn iteritems(
        &self,
        prefix: Option<&[String]>,
        shallow: bool,
    ) -> Result<Vec<(DataIndexKey, DataIndexEntry)>, IndexError> {
        let prefix = prefix.unwrap_or(&[]);
        if let Some((key, _)) = self.longest_prefix(prefix) {
            self.load_entry(&key)?;
        }
        for (key, entry) in self.collect(prefix, shallow) {
            if entry.is_expandable() {
                self.load_entry(&key)?;
            }
        }
        Ok(self.collect(prefix, shallow))
    }

    pub fn has_node(&self, key: &[String]) -> bool {
        keys_below(&self.entries.borrow(), key).next().is_some()
    }

    pub fn longest_prefix(&self, key: &[String]) -> Option<(DataIndexKey, DataIndexEntry)> {
        let entries = self.entries.borrow();
        (0..=key.len())
            .rev()
            .find_map(|i| entries.get_key_value(&key[..i]))
            .map(|(k, v)| (k.clone(), v.clone()))
    }

    pub fn ls(&self, key: &[String]) -> Result<Vec<(DataIndexKey, EntryInfo)>, IndexError> {
        if let Some((dir_key, _)) = self.longest_prefix(key) {
            self.load_entry(&dir_key)?;
        }
        if let Some(entry) = self.entries.borrow().get(key) {
            if entry.is_expandable() {
                return Err(IndexError::TreeNotLoaded(key_to_path(key)));
            }
        }
        if !key.is_empty() && !self.has_node(key) {
            return Err(IndexError::KeyNotFound(key_to_path(key)));
        }

        let children: Vec<(DataIndexKey, Option<DataIndexEntry>)> = {
            let entries = self.entries.borrow();
            let mut children: Vec<(DataIndexKey, Option<DataIndexEntry>)> = Vec::new();
            for (k, _) in keys_below(&entries, key) {
                if k.len() <= key.len() {
                    continue;
                }
                let child = &k[..=key.len()];
                if children.last().is_some_and(|(last, _)| last.as_slice() == child) {
                    continue;
                }
                children.push((child.to_vec(), entries.get(child).cloned()));
            }
            children
        };
        Ok(children
            .into_iter()
            .map(|(k, entry)| {
                let info = self.info_from_entry(&k, entry);
                (k, info)
            })
            .collect())
    }
}

impl BaseDataIndex for DataIndex {
    fn get(&self, key: &[String]) -> Result<DataIndexEntry, IndexError> {
        DataIndex::get(self, key)
    }

    fn iteritems(
        &self,
        prefix: Option<&[String]>,
        shallow: bool,
    ) -> Result<Vec<(DataIndexKey, DataIndexEntry)>, IndexError> {
        DataIndex::iteritems(self, prefix, shallow)
    }

    fn ls(&self, key: &[String]) -> Result<Vec<(DataIndexKey, EntryInfo)>, IndexError> {
        DataIndex::ls(self, key)
    }

    fn has_node(&self, key: &[String]) -> bool {
        DataIndex::has_node(self, key)
    }

    fn longest_prefix(&self, key: &[String]) -> Option<(DataIndexKey, DataIndexEntry)> {
        DataIndex::longest_prefix(self, key)
    }
}

type SrcPick = fn(&Storage) -> Option<Arc<dyn ObjectStore>>;
type DestPick = fn(&Storage) -> Option<Arc<HashFileDB>>;

/// Transfer every hashed entry from one storage role to another, batched
/// per store pair.
fn transfer(index: &DataIndex, src: SrcPick, dest: DestPick) -> Result<TransferResult, IndexError> {
    let mut by_direction: BTreeMap<
        (String, String),
        (Arc<dyn ObjectStore>, Arc<HashFileDB>, BTreeSet<HashInfo>),
    > = BTreeMap::new();

    for (key, entry) in index.iteritems(None, false)? {
        let Some(hash_info) = entry.hash_info.filter(|h| !h.is_empty()) else {
            continue;
        };
        let storage = index.storage_map.get(&key);
        let pair = storage.as_ref().and_then(|s| Some((src(s)?, dest(s)?)));
        let Some((src_odb, dest_odb)) = pair else {
            return Err(IndexError::NoStorage(key_to_path(&key)));
        };
        let direction = (src_odb.location(), dest_odb.location());
        by_direction
            .entry(direction)
            .or_insert_with(|| (src_odb, dest_odb, BTreeSet::new()))
            .2
            .insert(hash_info);
    }

    let mut ret = TransferResult::default();
    for (_, (src_odb, dest_odb, hash_infos)) in by_direction {
        let res = transfer_objects(
            src_odb.as_ref(),
            &dest_odb,
            &hash_infos,
            &TransferOptions::default(),
        )?;
        ret.transferred.extend(res.transferred);
        ret.failed.extend(res.failed);
    }
    Ok(ret)
}

/// Move built objects into the cache.
pub fn commit(index: &DataIndex) -> Result<TransferResult, IndexError> {
    transfer(index, |s| s.odb.clone(), |s| s.cache.clone())
}

/// Upload cached objects to the remote.
pub fn push(index: &DataIndex) -> Result<TransferResult, IndexError> {
    transfer(
        index,
        |s| s.cache.clone().map(|c| c as Arc<dyn ObjectStore>),
        |s| s.remote.clone(),
    )
}

/// Download objects from the remote into the cache.
pub fn fetch(index: &DataIndex) -> Result<TransferResult, IndexError> {
    transfer(
        index,
        |s| s.remote.clone().map(|r| r as Arc<dyn ObjectStore>),
        |s| s.cache.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashfile::db::add_update_tree;
    use tempfile::TempDir;

    const FOO: &str = "acbd18db4cc2f85cedef654fccc4a4d8";
    const BAR: &str = "37b51d194a7513e45b56f6524f2d51f2";

    fn key(path: &str) -> DataIndexKey {
        super::super::path_to_key(path)
    }

    /// Cache holding foo and bar plus a tree {foo, sub/bar}.
    fn cache_with_tree(temp: &TempDir) -> (Arc<HashFileDB>, HashInfo) {
        let odb = HashFileDB::new(temp.path().join("cache"));
        odb.add_bytes(FOO, b"foo").unwrap();
        odb.add_bytes(BAR, b"bar").unwrap();
        let mut tree = Tree::new();
        tree.add(key("foo"), Some(Meta::with_size(3)), HashInfo::new("md5", FOO));
        tree.add(key("sub/bar"), Some(Meta::with_size(3)), HashInfo::new("md5", BAR));
        tree.digest("md5").unwrap();
        add_update_tree(&odb, &mut tree).unwrap();
        (Arc::new(odb), tree.hash_info.unwrap())
    }

    fn dir_entry(hash_info: HashInfo) -> DataIndexEntry {
        DataIndexEntry::new(Vec::new(), Some(Meta::dir()), Some(hash_info))
    }

    #[test]
    fn entry_dict_round_trip_keeps_loaded_null() {
        let entry = DataIndexEntry::new(key("a"), Some(Meta::with_size(1)), Some(HashInfo::new("md5", FOO)));
        let d = entry.to_dict();
        assert_eq!(d["loaded"], Value::Null);
        let back = DataIndexEntry::from_dict(&d);
        assert_eq!(back.meta, entry.meta);
        assert_eq!(back.hash_info, entry.hash_info);
        assert_eq!(back.loaded, None);
    }

    #[test]
    fn storage_mapping_uses_longest_prefix() {
        let mut map = StorageMapping::default();
        map.add(Vec::new(), Storage::data("/ws"));
        map.add(key("data"), Storage::data("/elsewhere"));

        assert_eq!(map.data_path(&key("a/b")).unwrap(), PathBuf::from("/ws/a/b"));
        assert_eq!(map.data_path(&key("data/x")).unwrap(), PathBuf::from("/elsewhere/x"));
        assert!(matches!(map.cache(&key("a")), Err(IndexError::NoStorage(_))));
    }

    #[test]
    fn get_expands_directory_trees() {
        let temp = TempDir::new().unwrap();
        let (cache, dir) = cache_with_tree(&temp);
        let index = DataIndex::new().with_storage(Vec::new(), Storage::default().with_cache(cache));
        index.insert(key("data"), dir_entry(dir));
        assert_eq!(index.len(), 1);

        let entry = index.get(&key("data/sub/bar")).unwrap();
        assert_eq!(entry.hash_info, Some(HashInfo::new("md5", BAR)));
        assert_eq!(index.get(&key("data")).unwrap().loaded, Some(true));
        // The implicit sub-directory got an entry
        assert!(index.get(&key("data/sub")).unwrap().is_dir());
        assert!(matches!(index.get(&key("data/nope")), Err(IndexError::KeyNotFound(_))));
    }

    #[test]
    fn short_keys_are_directories() {
        let index = DataIndex::new();
        index.insert(key("a/b/c"), DataIndexEntry::default());

        assert!(matches!(index.get(&key("a/b")), Err(IndexError::ShortKey(_))));
        let info = index.info(&key("a")).unwrap();
        assert!(info.is_dir());
        assert!(info.entry.is_none());
        assert!(!info.isdvc);
        assert!(index.info(&key("z")).is_err());
    }

    #[test]
    fn iteritems_loads_and_filters() {
        let temp = TempDir::new().unwrap();
        let (cache, dir) = cache_with_tree(&temp);
        let index = DataIndex::new().with_storage(Vec::new(), Storage::default().with_cache(cache));
        index.insert(key("data"), dir_entry(dir));
        index.insert(key("other"), DataIndexEntry::new(Vec::new(), Some(Meta::with_size(1)), None));

        let keys: Vec<String> = index
            .iteritems(None, false)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k.join("/"))
            .collect();
        assert_eq!(keys, vec!["data", "data/foo", "data/sub", "data/sub/bar", "other"]);

        let shallow: Vec<DataIndexKey> = index
            .iteritems(None, true)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(shallow, vec![key("data"), key("other")]);

        let sub = index.iteritems(Some(&key("data/sub")), false).unwrap();
        assert_eq!(sub.len(), 2);
    }

    #[test]
    fn ls_lists_children_with_info() {
        let temp = TempDir::new().unwrap();
        let (cache, dir) = cache_with_tree(&temp);
        let index = DataIndex::new().with_storage(Vec::new(), Storage::default().with_cache(cache));
        index.insert(key("data"), dir_entry(dir));

        let children = index.ls(&key("data")).unwrap();
        let names: Vec<(String, EntryType)> = children
            .iter()
            .map(|(k, info)| (k.join("/"), info.typ))
            .collect();
        assert_eq!(
            names,
            vec![
                ("data/foo".to_string(), EntryType::File),
                ("data/sub".to_string(), EntryType::Directory),
            ]
        );
        assert_eq!(children[0].1.hash(), Some(("md5", FOO)));

        let root = index.ls(&[]).unwrap();
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn ls_of_unavailable_tree_fails() {
        let index = DataIndex::new().with_storage(Vec::new(), Storage::default());
        index.insert(key("data"), dir_entry(HashInfo::new("md5", "123.dir")));
        assert!(matches!(index.ls(&key("data")), Err(IndexError::TreeNotLoaded(_))));
        // Iteration skips what cannot be loaded
        assert_eq!(index.iteritems(None, false).unwrap().len(), 1);
    }

    #[test]
    fn push_and_fetch_between_storages() {
        let temp = TempDir::new().unwrap();
        let (cache, dir) = cache_with_tree(&temp);
        let remote = Arc::new(HashFileDB::new(temp.path().join("remote")));
        let index = DataIndex::new().with_storage(
            Vec::new(),
            Storage::default().with_cache(cache.clone()).with_remote(remote.clone()),
        );
        index.insert(key("data"), dir_entry(dir.clone()));

        let pushed = push(&index).unwrap();
        assert_eq!(pushed.transferred.len(), 3);
        assert!(remote.exists(dir.value().unwrap()));

        cache.delete(FOO).unwrap();
        let fetched = fetch(&index).unwrap();
        assert_eq!(fetched.transferred, [HashInfo::new("md5", FOO)].into());
        assert!(cache.exists(FOO));
    }

    #[test]
    fn commit_requires_storage() {
        let index = DataIndex::new();
        index.insert(key("a"), DataIndexEntry::new(Vec::new(), None, Some(HashInfo::new("md5", FOO))));
        assert!(matches!(commit(&index), Err(IndexError::NoStorage(_))));
    }
}
