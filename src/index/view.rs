//! index::view
//!
//! Read-only views of an index restricted by a key filter.

use std::collections::BTreeSet;

use super::data_index::{BaseDataIndex, DataIndex, DataIndexEntry, EntryInfo};
use super::{key_to_path, DataIndexKey, IndexError};

/// Subset of a [`DataIndex`]. A key is visible when it and every ancestor
/// pass the filter.
#[derive(Debug)]
pub struct DataIndexView<'a> {
    index: &'a DataIndex,
    /// Visible keys with children.
    prefixes: BTreeSet<DataIndexKey>,
    /// Visible keys with entries.
    keys: BTreeSet<DataIndexKey>,
}

impl DataIndexView<'_> {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &DataIndexKey> {
        self.keys.iter()
    }

    fn visible(&self, key: &[String]) -> bool {
        self.keys.contains(key) || self.prefixes.contains(key)
    }
}

impl BaseDataIndex for DataIndexView<'_> {
    fn get(&self, key: &[String]) -> Result<DataIndexEntry, IndexError> {
        if self.keys.contains(key) {
            return self.index.get(key);
        }
        Err(IndexError::KeyNotFound(key_to_path(key)))
    }

    fn iteritems(
        &self,
        prefix: Option<&[String]>,
        shallow: bool,
    ) -> Result<Vec<(DataIndexKey, DataIndexEntry)>, IndexError> {
        let Some(prefix) = prefix else {
            return self
                .keys
                .iter()
                .map(|k| Ok((k.clone(), self.index.get(k)?)))
                .collect();
        };
        if !self.visible(prefix) {
            return Ok(Vec::new());
        }
        Ok(self
            .index
            .iteritems(Some(prefix), shallow)?
            .into_iter()
            .filter(|(k, _)| self.keys.contains(k))
            .collect())
    }

    fn ls(&self, key: &[String]) -> Result<Vec<(DataIndexKey, EntryInfo)>, IndexError> {
        if !key.is_empty() && !self.visible(key) {
            return Err(IndexError::KeyNotFound(key_to_path(key)));
        }
        Ok(self
            .index
            .ls(key)?
            .into_iter()
            .filter(|(k, _)| self.visible(k))
            .collect())
    }

    fn has_node(&self, key: &[String]) -> bool {
        self.visible(key)
    }

    fn longest_prefix(&self, key: &[String]) -> Option<(DataIndexKey, DataIndexEntry)> {
        if self.keys.contains(key) {
            return self.index.longest_prefix(key);
        }
        None
    }
}

/// View of `index` holding the keys accepted by `filter`. Directory trees
/// are expanded first so their contents can be filtered too.
pub fn view<'a>(
    index: &'a DataIndex,
    filter: impl Fn(&[String]) -> bool,
) -> Result<DataIndexView<'a>, IndexError> {
    let mut prefixes = BTreeSet::new();
    let mut keys = BTreeSet::new();

    for (key, _) in index.iteritems(None, false)? {
        if !(1..=key.len()).all(|depth| filter(&key[..depth])) {
            continue;
        }
        for depth in 1..key.len() {
            prefixes.insert(key[..depth].to_vec());
        }
        keys.insert(key);
    }

    Ok(DataIndexView {
        index,
        prefixes,
        keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash_info::HashInfo;
    use crate::core::meta::Meta;
    use crate::index::diff::{diff, DiffOptions};
    use crate::index::path_to_key;

    fn sample() -> DataIndex {
        let index = DataIndex::new();
        for (path, hash) in [("a/x", "1"), ("a/y", "2"), ("b/z", "3"), ("c", "4")] {
            index.insert(
                path_to_key(path),
                DataIndexEntry::new(Vec::new(), Some(Meta::with_size(1)), Some(HashInfo::new("md5", hash))),
            );
        }
        index
    }

    #[test]
    fn filter_hides_subtrees() {
        let index = sample();
        let v = view(&index, |key| key[0] != "b" && key.last().map(String::as_str) != Some("y")).unwrap();

        let keys: Vec<String> = v.keys().map(|k| k.join("/")).collect();
        assert_eq!(keys, vec!["a/x", "c"]);
        assert!(v.has_node(&path_to_key("a")));
        assert!(!v.has_node(&path_to_key("b")));
        assert!(matches!(v.get(&path_to_key("b/z")), Err(IndexError::KeyNotFound(_))));
        assert_eq!(v.iteritems(Some(&path_to_key("a")), false).unwrap().len(), 1);
    }

    #[test]
    fn views_can_be_listed_and_diffed() {
        let index = sample();
        let v = view(&index, |key| key[0] == "a").unwrap();

        let root: Vec<String> = v.ls(&[]).unwrap().into_iter().map(|(k, _)| k.join("/")).collect();
        assert_eq!(root, vec!["a"]);

        let changes = diff(Some(&v), Some(&index), &DiffOptions::default()).unwrap();
        let added: Vec<String> = changes
            .iter()
            .filter_map(|c| c.key())
            .map(|k| k.join("/"))
            .collect();
        assert_eq!(added, vec!["c", "b/z"]);
    }
}
