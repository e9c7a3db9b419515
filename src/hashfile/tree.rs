//! hashfile::tree
//!
//! Directory objects.
//!
//! A tree maps relative path parts to the meta and hash of each file below
//! a directory. Its object id is the digest of its serialized listing with
//! a `.dir` suffix, so identical directory contents always share one tree
//! object.
//!
//! # Merging
//!
//! [`merge`] performs a three-way merge of trees the way dictionary diffs
//! are merged: each side's changes relative to the ancestor are classified
//! as `add`, `remove` or `change`, applied in both orders, and any key where
//! the two orders disagree is a conflict.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::db::{HashFileDB, ObjectStore, OdbError};
use super::hash::{hash_bytes, HashError, ALGORITHMS};
use super::pyjson;
use super::Object;
use crate::core::hash_info::{HashInfo, HASH_DIR_SUFFIX};
use crate::core::meta::Meta;
use crate::index::{DataIndex, IndexError};

/// Key of a tree entry: path parts relative to the tree root.
pub type TreeKey = Vec<String>;

/// Meta and hash of one entry.
pub type TreeValue = (Option<Meta>, HashInfo);

pub const PARAM_RELPATH: &str = "relpath";

/// Diff types [`merge_dicts`] accepts by default.
pub const DEFAULT_ALLOWED: &[&str] = &["add"];

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("tree entry is missing '{PARAM_RELPATH}'")]
    MissingRelpath,

    #[error("tree entry is not an object")]
    InvalidEntry,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Odb(#[from] OdbError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    entries: BTreeMap<TreeKey, TreeValue>,
    /// Set once the tree has been digested or loaded.
    pub hash_info: Option<HashInfo>,
    /// Where the serialized tree is stored, when it is stored.
    pub path: Option<PathBuf>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: TreeKey, meta: Option<Meta>, hash_info: HashInfo) {
        self.entries.insert(key, (meta, hash_info));
    }

    pub fn get(&self, key: &[String]) -> Option<&TreeValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TreeKey, &Option<Meta>, &HashInfo)> {
        self.entries.iter().map(|(k, (m, h))| (k, m, h))
    }

    pub fn as_dict(&self) -> BTreeMap<TreeKey, TreeValue> {
        self.entries.clone()
    }

    pub fn oid(&self) -> Option<&str> {
        self.hash_info.as_ref().and_then(HashInfo::value)
    }

    /// Listing sorted by `relpath`, optionally carrying meta fields.
    pub fn as_list(&self, with_meta: bool) -> Vec<Map<String, Value>> {
        let mut list: Vec<Map<String, Value>> = self
            .iter()
            .map(|(key, meta, hash_info)| {
                let mut entry = Map::new();
                if with_meta {
                    if let Some(meta) = meta {
                        entry.extend(meta.to_dict());
                    }
                }
                entry.extend(hash_info.to_dict());
                entry.insert(PARAM_RELPATH.into(), Value::String(key.join("/")));
                entry
            })
            .collect();
        list.sort_by(|a, b| relpath_of(a).cmp(relpath_of(b)));
        list
    }

    /// Serialized listing; the bytes that get digested and stored.
    pub fn as_bytes(&self) -> Vec<u8> {
        let list: Vec<Value> = self.as_list(false).into_iter().map(Value::Object).collect();
        // A list of string maps always serializes
        pyjson::to_vec(&list).unwrap_or_default()
    }

    /// Compute the tree's object id with algorithm `name`.
    pub fn digest(&mut self, name: &str) -> Result<(), HashError> {
        let value = hash_bytes(&self.as_bytes(), name)?;
        self.hash_info = Some(HashInfo::new(name, format!("{}{}", value, HASH_DIR_SUFFIX)));
        self.path = None;
        Ok(())
    }

    /// Parse a listing. With `hash_name`, hashes are taken from that meta
    /// field instead of the entry's own hash key.
    pub fn from_list(list: &[Value], hash_name: Option<&str>) -> Result<Self, TreeError> {
        let mut tree = Tree::new();
        for value in list {
            let mut entry = value.as_object().cloned().ok_or(TreeError::InvalidEntry)?;
            let relpath = entry
                .remove(PARAM_RELPATH)
                .and_then(|v| v.as_str().map(String::from))
                .ok_or(TreeError::MissingRelpath)?;
            let key: TreeKey = relpath.split('/').map(String::from).collect();
            let meta = Meta::from_dict(&entry);
            let hash_info = match hash_name {
                Some(name) => HashInfo {
                    name: Some(name.to_string()),
                    value: meta.hash_value(name).map(String::from),
                    obj_name: None,
                },
                None => hash_info_from_entry(&entry),
            };
            tree.add(key, Some(meta), hash_info);
        }
        Ok(tree)
    }

    /// Read a stored tree.
    pub fn load(odb: &dyn ObjectStore, hash_info: &HashInfo) -> Result<Self, OdbError> {
        let oid = hash_info.value().unwrap_or_default();
        let bytes = odb.read(oid)?;
        let raw: Value = serde_json::from_slice(&bytes).map_err(|_| OdbError::Corrupted(oid.into()))?;
        let Value::Array(list) = raw else {
            debug!(
                "dir cache file format error '{}' [skipping the file]",
                odb.get(oid).path.display()
            );
            return Err(OdbError::Corrupted(oid.into()));
        };

        let mut tree = Tree::from_list(&list, None).map_err(|_| OdbError::Corrupted(oid.into()))?;
        tree.path = Some(odb.get(oid).path);
        tree.hash_info = Some(hash_info.clone());
        Ok(tree)
    }

    /// Copy holding only the entries strictly below `prefix`, with their
    /// full keys and this tree's identity.
    pub fn filter(&self, prefix: &[String]) -> Tree {
        Tree {
            entries: self
                .entries
                .iter()
                .filter(|(k, _)| is_below(k, prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            hash_info: self.hash_info.clone(),
            path: self.path.clone(),
        }
    }

    /// Object at `prefix`: the stored file for a file entry, a freshly
    /// digested sub-tree for a directory, `None` when nothing is there.
    pub fn get_obj(&self, odb: &dyn ObjectStore, prefix: &[String]) -> Result<Option<Object>, HashError> {
        if let Some((_, hash_info)) = self.entries.get(prefix) {
            if let Some(oid) = hash_info.value() {
                return Ok(Some(Object::File(odb.get(oid))));
            }
        }

        let depth = prefix.len();
        let mut tree = Tree::new();
        for (key, (meta, hash_info)) in &self.entries {
            if is_below(key, prefix) {
                tree.add(key[depth..].to_vec(), meta.clone(), hash_info.clone());
            }
        }
        if tree.is_empty() {
            return Ok(None);
        }
        tree.digest(odb.hash_name())?;
        Ok(Some(Object::Tree(tree)))
    }

    /// Names of the immediate children of `prefix`.
    pub fn ls(&self, prefix: &[String]) -> Vec<String> {
        let depth = prefix.len();
        let names: BTreeSet<&String> = self
            .entries
            .keys()
            .filter(|k| is_below(k, prefix))
            .map(|k| &k[depth])
            .collect();
        names.into_iter().cloned().collect()
    }
}

fn relpath_of(entry: &Map<String, Value>) -> &str {
    entry.get(PARAM_RELPATH).and_then(Value::as_str).unwrap_or_default()
}

fn hash_info_from_entry(entry: &Map<String, Value>) -> HashInfo {
    ALGORITHMS
        .iter()
        .find_map(|name| {
            entry
                .get(*name)
                .and_then(Value::as_str)
                .map(|value| HashInfo::new(*name, value))
        })
        .unwrap_or_default()
}

/// True when `key` lies strictly below `prefix`.
fn is_below(key: &[String], prefix: &[String]) -> bool {
    key.len() > prefix.len() && key.starts_with(prefix)
}

/// Total stored size of a tree's objects, `None` if any is missing.
pub fn du(odb: &HashFileDB, tree: &Tree) -> Option<u64> {
    tree.iter().try_fold(0u64, |acc, (_, _, hash_info)| {
        let path = odb.oid_to_path(hash_info.value()?);
        std::fs::metadata(path).ok().map(|m| acc + m.len())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffType {
    Add,
    Remove,
    Change,
}

impl DiffType {
    fn as_str(self) -> &'static str {
        match self {
            DiffType::Add => "add",
            DiffType::Remove => "remove",
            DiffType::Change => "change",
        }
    }
}

type TreeDict = BTreeMap<TreeKey, TreeValue>;
type DictDiff = Vec<(DiffType, TreeKey, Option<TreeValue>)>;

fn diff_dicts(ancestor: &TreeDict, other: &TreeDict, allowed: &[&str]) -> Result<DictDiff, MergeError> {
    let mut result = Vec::new();
    for (key, value) in other {
        match ancestor.get(key) {
            None => result.push((DiffType::Add, key.clone(), Some(value.clone()))),
            Some(old) if old != value => result.push((DiffType::Change, key.clone(), Some(value.clone()))),
            Some(_) => {}
        }
    }
    for key in ancestor.keys() {
        if !other.contains_key(key) {
            result.push((DiffType::Remove, key.clone(), None));
        }
    }

    if let Some((typ, _, _)) = result.iter().find(|(t, _, _)| !allowed.contains(&t.as_str())) {
        return Err(MergeError::Conflict(format!(
            "unable to auto-merge directories with diff that contains '{}'ed files",
            typ.as_str()
        )));
    }
    Ok(result)
}

fn patch(diffs: &[&DictDiff], base: &TreeDict) -> Result<TreeDict, MergeError> {
    let mut out = base.clone();
    for (typ, key, value) in diffs.iter().flat_map(|d| d.iter()) {
        match (typ, value) {
            (DiffType::Remove, _) => {
                if out.remove(key).is_none() {
                    return Err(MergeError::Conflict(format!(
                        "unable to auto-merge the following paths:\nboth deleted: '{}'",
                        key.join("/")
                    )));
                }
            }
            (_, Some(value)) => {
                out.insert(key.clone(), value.clone());
            }
            (_, None) => {}
        }
    }
    Ok(out)
}

/// Three-way merge of tree dictionaries.
///
/// `allowed` lists the diff types (`add`, `remove`, `change`) either side
/// may contain; it defaults to `["add"]`.
pub fn merge_dicts(
    ancestor: &TreeDict,
    ours: &TreeDict,
    theirs: &TreeDict,
    allowed: Option<&[&str]>,
) -> Result<TreeDict, MergeError> {
    let allowed = allowed.filter(|a| !a.is_empty()).unwrap_or(DEFAULT_ALLOWED);

    let our_diff = diff_dicts(ancestor, ours, allowed)?;
    if our_diff.is_empty() {
        return Ok(theirs.clone());
    }
    let their_diff = diff_dicts(ancestor, theirs, allowed)?;
    if their_diff.is_empty() {
        return Ok(ours.clone());
    }

    let ours_first = patch(&[&our_diff, &their_diff], ancestor)?;
    let theirs_first = patch(&[&their_diff, &our_diff], ancestor)?;

    let keys: BTreeSet<&TreeKey> = ours_first.keys().chain(theirs_first.keys()).collect();
    let unmergeable: Vec<String> = keys
        .into_iter()
        .filter(|k| ours_first.get(*k) != theirs_first.get(*k))
        .map(|k| k.join("/"))
        .collect();
    if !unmergeable.is_empty() {
        return Err(MergeError::Conflict(format!(
            "unable to auto-merge the following paths:\n{}",
            unmergeable.join("\n")
        )));
    }
    Ok(ours_first)
}

/// Merge two stored trees against an optional common ancestor and digest
/// the result.
pub fn merge(
    odb: &dyn ObjectStore,
    ancestor: Option<&HashInfo>,
    ours: &HashInfo,
    theirs: &HashInfo,
    allowed: Option<&[&str]>,
) -> Result<Tree, MergeError> {
    let ancestor = match ancestor {
        Some(hash_info) => Tree::load(odb, hash_info)?,
        None => Tree::new(),
    };
    let ours = Tree::load(odb, ours)?;
    let theirs = Tree::load(odb, theirs)?;

    let merged_dict = merge_dicts(&ancestor.entries, &ours.entries, &theirs.entries, allowed)?;
    let mut merged = Tree {
        entries: merged_dict,
        ..Tree::default()
    };
    merged.digest(odb.hash_name())?;
    Ok(merged)
}

/// Collect the file entries of `index` below `prefix` into a tree, with
/// directory meta summing their sizes.
pub fn tree_from_index(index: &DataIndex, prefix: &[String]) -> Result<(Meta, Tree), IndexError> {
    let mut tree_meta = Meta::dir();
    let mut size = 0;
    let mut nfiles = 0;
    let mut tree = Tree::new();
    for (key, entry) in index.iteritems(Some(prefix), false)? {
        let isdir = entry.meta.as_ref().is_some_and(|m| m.isdir);
        if key.as_slice() == prefix || isdir {
            continue;
        }
        let Some(hash_info) = entry.hash_info.clone() else {
            continue;
        };
        size += entry.meta.as_ref().and_then(|m| m.size).unwrap_or(0);
        nfiles += 1;
        tree.add(key[prefix.len()..].to_vec(), entry.meta.clone(), hash_info);
    }
    tree_meta.size = Some(size);
    tree_meta.nfiles = Some(nfiles);
    Ok((tree_meta, tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashfile::db::ReferenceDB;

    const FOO: &str = "acbd18db4cc2f85cedef654fccc4a4d8";
    const BAR: &str = "37b51d194a7513e45b56f6524f2d51f2";

    fn key(path: &str) -> TreeKey {
        path.split('/').map(String::from).collect()
    }

    fn foo_bar() -> Tree {
        let mut tree = Tree::new();
        tree.add(key("foo"), None, HashInfo::new("md5", FOO));
        tree.add(key("bar"), None, HashInfo::new("md5", BAR));
        tree
    }

    #[test]
    fn digest_matches_known_value() {
        let mut tree = foo_bar();
        tree.digest("md5").unwrap();
        assert_eq!(tree.oid(), Some("5ea40360f5b4ec688df672a4db9c17d1.dir"));
    }

    #[test]
    fn listing_is_sorted_by_relpath() {
        let mut tree = Tree::new();
        tree.add(key("a/b"), None, HashInfo::new("md5", "1"));
        tree.add(key("a-b"), None, HashInfo::new("md5", "2"));
        let relpaths: Vec<_> = tree.as_list(false).iter().map(|e| relpath_of(e).to_string()).collect();
        // '-' sorts before '/'
        assert_eq!(relpaths, vec!["a-b", "a/b"]);

        assert_eq!(
            String::from_utf8(foo_bar().as_bytes()).unwrap(),
            format!(r#"[{{"md5": "{}", "relpath": "bar"}}, {{"md5": "{}", "relpath": "foo"}}]"#, BAR, FOO)
        );
    }

    #[test]
    fn as_list_with_meta() {
        let mut tree = Tree::new();
        tree.add(key("foo"), Some(Meta::with_size(3)), HashInfo::new("md5", FOO));
        let list = tree.as_list(true);
        assert_eq!(list[0].get("size"), Some(&Value::from(3)));
        assert!(tree.as_list(false)[0].get("size").is_none());
    }

    #[test]
    fn from_list_reads_hashes() {
        let list = vec![
            serde_json::json!({"md5": FOO, "relpath": "dir/foo", "size": 3}),
            serde_json::json!({"md5": BAR, "relpath": "bar"}),
        ];
        let tree = Tree::from_list(&list, None).unwrap();
        let (meta, hi) = tree.get(&key("dir/foo")).unwrap();
        assert_eq!(hi, &HashInfo::new("md5", FOO));
        assert_eq!(meta.as_ref().unwrap().size, Some(3));

        let by_meta = Tree::from_list(&list, Some("md5")).unwrap();
        assert_eq!(by_meta.get(&key("bar")).unwrap().1.value(), Some(BAR));

        let bad = vec![serde_json::json!({"md5": FOO})];
        assert!(matches!(Tree::from_list(&bad, None), Err(TreeError::MissingRelpath)));
    }

    #[test]
    fn load_rejects_non_list() {
        let mut odb = ReferenceDB::new("md5");
        odb.add_bytes("a.dir", b"{}".to_vec());
        odb.add_bytes("b.dir", b"not json".to_vec());

        let err = Tree::load(&odb, &HashInfo::new("md5", "a.dir")).unwrap_err();
        assert_eq!(err.to_string(), "object a.dir is corrupted");
        assert!(matches!(
            Tree::load(&odb, &HashInfo::new("md5", "b.dir")),
            Err(OdbError::Corrupted(_))
        ));
        assert!(Tree::load(&odb, &HashInfo::new("md5", "c.dir")).unwrap_err().is_not_found());
    }

    #[test]
    fn load_round_trips_stored_tree() {
        let mut tree = foo_bar();
        tree.digest("md5").unwrap();
        let hash_info = tree.hash_info.clone().unwrap();

        let mut odb = ReferenceDB::new("md5");
        odb.add_bytes(hash_info.value().unwrap(), tree.as_bytes());
        let loaded = Tree::load(&odb, &hash_info).unwrap();
        assert_eq!(loaded.as_bytes(), tree.as_bytes());
        assert_eq!(loaded.hash_info, Some(hash_info));
    }

    #[test]
    fn filter_get_obj_and_ls() {
        let mut tree = Tree::new();
        tree.add(key("data/a"), None, HashInfo::new("md5", FOO));
        tree.add(key("data/sub/b"), None, HashInfo::new("md5", BAR));
        tree.add(key("other"), None, HashInfo::new("md5", BAR));
        let odb = ReferenceDB::new("md5");

        let filtered = tree.filter(&key("data"));
        assert_eq!(filtered.len(), 2);
        assert!(filtered.get(&key("data/a")).is_some());

        match tree.get_obj(&odb, &key("data/a")).unwrap() {
            Some(Object::File(obj)) => assert_eq!(obj.oid(), FOO),
            other => panic!("unexpected {:?}", other),
        }
        match tree.get_obj(&odb, &key("data")).unwrap() {
            Some(Object::Tree(sub)) => {
                assert!(sub.get(&key("sub/b")).is_some());
                assert!(sub.oid().unwrap().ends_with(".dir"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(tree.get_obj(&odb, &key("missing")).unwrap().is_none());

        assert_eq!(tree.ls(&[]), vec!["data", "other"]);
        assert_eq!(tree.ls(&key("data")), vec!["a", "sub"]);
    }

    #[test]
    fn du_sums_or_gives_up() {
        let temp = tempfile::TempDir::new().unwrap();
        let odb = HashFileDB::new(temp.path().join("cache"));
        odb.add_bytes(FOO, b"foo").unwrap();
        odb.add_bytes(BAR, b"bar").unwrap();
        assert_eq!(du(&odb, &foo_bar()), Some(6));

        let mut with_missing = foo_bar();
        with_missing.add(key("baz"), None, HashInfo::new("md5", "ffff"));
        assert_eq!(du(&odb, &with_missing), None);
    }

    fn dict(entries: &[(&str, &str)]) -> TreeDict {
        entries
            .iter()
            .map(|(k, v)| (key(k), (None, HashInfo::new("md5", *v))))
            .collect()
    }

    #[test]
    fn merge_additions() {
        let ancestor = dict(&[("foo", "1")]);
        let ours = dict(&[("foo", "1"), ("bar", "2")]);
        let theirs = dict(&[("foo", "1"), ("baz", "3")]);
        let merged = merge_dicts(&ancestor, &ours, &theirs, None).unwrap();
        assert_eq!(merged, dict(&[("foo", "1"), ("bar", "2"), ("baz", "3")]));

        // One side unchanged takes the other
        assert_eq!(merge_dicts(&ancestor, &ancestor, &theirs, None).unwrap(), theirs);
    }

    #[test]
    fn merge_rejects_disallowed_diffs() {
        let ancestor = dict(&[("foo", "1")]);
        let ours = dict(&[]);
        let err = merge_dicts(&ancestor, &ours, &ancestor, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to auto-merge directories with diff that contains 'remove'ed files"
        );
    }

    #[test]
    fn merge_conflicts() {
        let ancestor = dict(&[("foo", "1")]);
        let ours = dict(&[("foo", "1"), ("a/b", "2")]);
        let theirs = dict(&[("foo", "1"), ("a/b", "3")]);
        let err = merge_dicts(&ancestor, &ours, &theirs, None).unwrap_err();
        assert_eq!(err.to_string(), "unable to auto-merge the following paths:\na/b");

        let both_deleted = dict(&[("bar", "2")]);
        let theirs = dict(&[("baz", "3")]);
        let err = merge_dicts(&ancestor, &both_deleted, &theirs, Some(&["add", "remove"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unable to auto-merge the following paths:\nboth deleted: 'foo'"
        );
    }

    #[test]
    fn merge_loads_and_digests() {
        let mut odb = ReferenceDB::new("md5");
        let mut stored = |entries: &[(&str, &str)]| {
            let mut tree = Tree::new();
            for (k, v) in entries {
                tree.add(key(k), None, HashInfo::new("md5", *v));
            }
            tree.digest("md5").unwrap();
            let hi = tree.hash_info.clone().unwrap();
            odb.add_bytes(hi.value().unwrap(), tree.as_bytes());
            hi
        };
        let ancestor = stored(&[("foo", FOO)]);
        let ours = stored(&[("foo", FOO), ("bar", BAR)]);
        let theirs = stored(&[("foo", FOO)]);

        let merged = merge(&odb, Some(&ancestor), &ours, &theirs, None).unwrap();
        assert_eq!(merged.oid(), Some("5ea40360f5b4ec688df672a4db9c17d1.dir"));
    }
}
