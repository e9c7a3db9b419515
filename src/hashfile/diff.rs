//! hashfile::diff
//!
//! Entry-level comparison of two objects.
//!
//! Both sides are flattened into keys: the root (`[""]`) plus every tree
//! key. Each key becomes a [`Change`] classified as add, modify, delete or
//! unchanged.

use std::collections::{BTreeMap, BTreeSet};

use super::db::ObjectStore;
use super::tree::TreeKey;
use super::Object;
use crate::core::hash_info::HashInfo;
use crate::core::meta::Meta;

/// Key of the object itself.
pub fn root_key() -> TreeKey {
    vec![String::new()]
}

pub fn is_root(key: &[String]) -> bool {
    key.len() == 1 && key[0].is_empty()
}

/// One side of a change. Equality ignores `in_cache` and `meta`.
#[derive(Debug, Clone, Default)]
pub struct TreeEntry {
    pub in_cache: bool,
    pub key: TreeKey,
    pub meta: Option<Meta>,
    pub oid: Option<HashInfo>,
}

impl TreeEntry {
    /// True when the entry has a hash.
    pub fn is_present(&self) -> bool {
        self.oid.as_ref().is_some_and(|h| !h.is_empty())
    }
}

impl PartialEq for TreeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.oid == other.oid
    }
}

impl Eq for TreeEntry {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeType {
    Add,
    Modify,
    Delete,
    Unchanged,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Add => "add",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
            ChangeType::Unchanged => "unchanged",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub old: TreeEntry,
    pub new: TreeEntry,
    pub typ: ChangeType,
}

impl Change {
    pub fn new(old: TreeEntry, new: TreeEntry) -> Self {
        let typ = match (old.is_present(), new.is_present()) {
            (false, false) => ChangeType::Unchanged,
            (true, false) => ChangeType::Delete,
            (false, true) => ChangeType::Add,
            _ if old != new => ChangeType::Modify,
            _ => ChangeType::Unchanged,
        };
        Self { old, new, typ }
    }

    pub fn has_changed(&self) -> bool {
        self.typ != ChangeType::Unchanged
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub added: Vec<Change>,
    pub modified: Vec<Change>,
    pub deleted: Vec<Change>,
    pub unchanged: Vec<Change>,
}

impl DiffResult {
    /// True when anything was added, modified or deleted.
    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty())
    }

    pub fn stats(&self) -> BTreeMap<&'static str, usize> {
        BTreeMap::from([
            ("added", self.added.len()),
            ("modified", self.modified.len()),
            ("deleted", self.deleted.len()),
            ("unchanged", self.unchanged.len()),
        ])
    }

    /// Sections in display order, with their names.
    pub fn sections(&self) -> [(&'static str, &[Change]); 4] {
        [
            ("added", self.added.as_slice()),
            ("modified", self.modified.as_slice()),
            ("deleted", self.deleted.as_slice()),
            ("unchanged", self.unchanged.as_slice()),
        ]
    }
}

fn keys(obj: Option<&Object>) -> Vec<TreeKey> {
    let Some(obj) = obj else {
        return Vec::new();
    };
    let mut keys = vec![root_key()];
    if let Object::Tree(tree) = obj {
        keys.extend(tree.iter().map(|(k, _, _)| k.clone()));
    }
    keys
}

fn lookup(obj: Option<&Object>, key: &[String]) -> (Option<Meta>, Option<HashInfo>) {
    match obj {
        None => (None, None),
        Some(obj) if is_root(key) => (None, obj.hash_info().cloned()),
        Some(Object::Tree(tree)) => match tree.get(key) {
            Some((meta, hash_info)) => (meta.clone(), Some(hash_info.clone())),
            None => (None, None),
        },
        Some(Object::File(_)) => (None, None),
    }
}

/// Diff two objects, asking `in_cache` whether each hash is stored.
pub fn diff_with(
    old: Option<&Object>,
    new: Option<&Object>,
    in_cache: impl Fn(&HashInfo) -> bool,
) -> DiffResult {
    let mut ret = DiffResult::default();
    if old.is_none() && new.is_none() {
        return ret;
    }

    let all_keys: BTreeSet<TreeKey> = keys(old).into_iter().chain(keys(new)).collect();
    let cached = |oid: &Option<HashInfo>| oid.as_ref().is_some_and(|h| !h.is_empty() && in_cache(h));

    for key in all_keys {
        let (old_meta, old_oid) = lookup(old, &key);
        let (new_meta, new_oid) = lookup(new, &key);
        let change = Change::new(
            TreeEntry {
                in_cache: cached(&old_oid),
                key: key.clone(),
                meta: old_meta,
                oid: old_oid,
            },
            TreeEntry {
                in_cache: cached(&new_oid),
                key,
                meta: new_meta,
                oid: new_oid,
            },
        );
        match change.typ {
            ChangeType::Add => ret.added.push(change),
            ChangeType::Modify => ret.modified.push(change),
            ChangeType::Delete => ret.deleted.push(change),
            ChangeType::Unchanged => ret.unchanged.push(change),
        }
    }
    ret
}

/// Diff two objects; an entry is in the cache when it passes a hash check.
pub fn diff(old: Option<&Object>, new: Option<&Object>, cache: &dyn ObjectStore) -> DiffResult {
    diff_with(old, new, |hash_info| {
        hash_info
            .value()
            .is_some_and(|oid| cache.check(oid, true).is_ok())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashfile::db::HashFileDB;
    use crate::hashfile::tree::Tree;
    use tempfile::TempDir;

    fn tree(entries: &[(&str, &str)]) -> Object {
        let mut tree = Tree::new();
        for (k, v) in entries {
            tree.add(k.split('/').map(String::from).collect(), None, HashInfo::new("md5", *v));
        }
        tree.digest("md5").unwrap();
        Object::Tree(tree)
    }

    fn paths(changes: &[Change]) -> Vec<String> {
        changes.iter().map(|c| c.new.key.join("/")).collect()
    }

    #[test]
    fn classifies_entries() {
        let old = tree(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let new = tree(&[("a", "1"), ("b", "22"), ("d", "4")]);
        let d = diff_with(Some(&old), Some(&new), |_| true);

        assert_eq!(paths(&d.added), vec!["d"]);
        assert_eq!(paths(&d.modified), vec!["", "b"]);
        assert_eq!(d.deleted.len(), 1);
        assert_eq!(d.deleted[0].old.key, vec!["c".to_string()]);
        assert_eq!(paths(&d.unchanged), vec!["a"]);
        assert!(d.has_changes());
        assert_eq!(d.stats()["modified"], 2);
    }

    #[test]
    fn identical_objects_have_no_changes() {
        let obj = tree(&[("a", "1")]);
        let d = diff_with(Some(&obj), Some(&obj), |_| true);
        assert!(!d.has_changes());
        assert_eq!(d.unchanged.len(), 2);
        assert!(!diff_with(None, None, |_| true).has_changes());
    }

    #[test]
    fn one_sided_diffs() {
        let obj = tree(&[("a", "1")]);
        assert_eq!(diff_with(None, Some(&obj), |_| true).added.len(), 2);
        assert_eq!(diff_with(Some(&obj), None, |_| true).deleted.len(), 2);
    }

    #[test]
    fn equality_ignores_cache_and_meta() {
        let a = TreeEntry {
            in_cache: true,
            key: vec!["x".into()],
            meta: Some(Meta::with_size(1)),
            oid: Some(HashInfo::new("md5", "1")),
        };
        let b = TreeEntry {
            in_cache: false,
            meta: None,
            ..a.clone()
        };
        assert_eq!(a, b);
    }

    #[test]
    fn in_cache_comes_from_odb() {
        let temp = TempDir::new().unwrap();
        let odb = HashFileDB::new(temp.path().join("cache"));
        odb.add_bytes("acbd18db4cc2f85cedef654fccc4a4d8", b"foo").unwrap();

        let new = tree(&[("foo", "acbd18db4cc2f85cedef654fccc4a4d8"), ("bar", "ffff")]);
        let d = diff(None, Some(&new), &odb);
        let cached: Vec<(String, bool)> = d
            .added
            .iter()
            .map(|c| (c.new.key.join("/"), c.new.in_cache))
            .collect();
        assert!(cached.contains(&("foo".to_string(), true)));
        assert!(cached.contains(&("bar".to_string(), false)));
        // The tree itself was never stored
        assert!(cached.contains(&(String::new(), false)));
    }

    #[test]
    fn unprotected_corrupt_objects_are_not_in_cache() {
        let temp = TempDir::new().unwrap();
        let odb = HashFileDB::new(temp.path().join("cache"));
        let oid = "acbd18db4cc2f85cedef654fccc4a4d8";
        let path = odb.oid_to_path(oid);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not foo").unwrap();

        let new = tree(&[("foo", oid)]);
        let d = diff(None, Some(&new), &odb);
        let foo = d.added.iter().find(|c| c.new.key == vec!["foo".to_string()]).unwrap();
        assert!(!foo.new.in_cache);
        assert!(!path.exists());
    }
}
