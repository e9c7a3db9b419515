//! index::diff
//!
//! Breadth-first comparison of two indexes, one directory level at a time.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use super::data_index::{BaseDataIndex, DataIndexEntry, EntryInfo};
use super::{DataIndexKey, IndexError};
use crate::core::hash_info::HashInfo;
use crate::core::meta::Meta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeKind {
    Add,
    Modify,
    Rename,
    Delete,
    Unchanged,
    /// The contents of a directory could not be listed on one side.
    Unknown,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Add => "add",
            ChangeKind::Modify => "modify",
            ChangeKind::Rename => "rename",
            ChangeKind::Delete => "delete",
            ChangeKind::Unchanged => "unchanged",
            ChangeKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub typ: ChangeKind,
    pub old: Option<DataIndexEntry>,
    pub new: Option<DataIndexEntry>,
}

impl Change {
    /// Key of the side the change is about. Renames have two keys and
    /// return `None`.
    pub fn key(&self) -> Option<&DataIndexKey> {
        let entry = match self.typ {
            ChangeKind::Rename => return None,
            ChangeKind::Unknown => self.old.as_ref().or(self.new.as_ref()),
            ChangeKind::Add => self.new.as_ref(),
            _ => self.old.as_ref(),
        };
        entry.map(|e| &e.key)
    }

    pub fn has_changed(&self) -> bool {
        self.typ != ChangeKind::Unchanged
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffOptions {
    /// Pair deletes and adds of the same hash into renames.
    pub with_renames: bool,
    pub with_unchanged: bool,
    /// Report entries under unlistable directories as unknown.
    pub with_unknown: bool,
    pub hash_only: bool,
    pub meta_only: bool,
    /// Do not descend into directories that have entries.
    pub shallow: bool,
}

fn diff_meta(old: Option<&Meta>, new: Option<&Meta>) -> ChangeKind {
    if old != new {
        ChangeKind::Modify
    } else {
        ChangeKind::Unchanged
    }
}

fn present(h: Option<&HashInfo>) -> Option<&HashInfo> {
    h.filter(|h| !h.is_empty())
}

fn diff_hash_info(old: Option<&HashInfo>, new: Option<&HashInfo>) -> ChangeKind {
    match (present(old), present(new)) {
        (None, Some(_)) => ChangeKind::Add,
        (Some(_), None) => ChangeKind::Delete,
        (Some(o), Some(n)) if o != n => ChangeKind::Modify,
        _ => ChangeKind::Unchanged,
    }
}

fn diff_entry(
    old: Option<&DataIndexEntry>,
    new: Option<&DataIndexEntry>,
    opts: &DiffOptions,
    unknown: bool,
) -> ChangeKind {
    if unknown {
        return ChangeKind::Unknown;
    }
    match (old, new) {
        (Some(_), None) => return ChangeKind::Delete,
        (None, Some(_)) => return ChangeKind::Add,
        _ => {}
    }

    let meta_diff = diff_meta(
        old.and_then(|e| e.meta.as_ref()),
        new.and_then(|e| e.meta.as_ref()),
    );
    let hi_diff = diff_hash_info(
        old.and_then(|e| e.hash_info.as_ref()),
        new.and_then(|e| e.hash_info.as_ref()),
    );

    if opts.meta_only {
        return meta_diff;
    }
    if opts.hash_only {
        return hi_diff;
    }
    if meta_diff != ChangeKind::Unchanged || hi_diff != ChangeKind::Unchanged {
        return ChangeKind::Modify;
    }
    ChangeKind::Unchanged
}

type Items = BTreeMap<DataIndexKey, EntryInfo>;

/// Children of `key`, and whether they could not be listed.
fn get_items(
    index: Option<&dyn BaseDataIndex>,
    key: &[String],
    entry: Option<&DataIndexEntry>,
    opts: &DiffOptions,
) -> Result<(Items, bool), IndexError> {
    let Some(index) = index else {
        return Ok((Items::new(), false));
    };
    if opts.shallow && entry.is_some() {
        return Ok((Items::new(), false));
    }
    match index.ls(key) {
        Ok(items) => Ok((items.into_iter().collect(), false)),
        Err(IndexError::KeyNotFound(_)) => Ok((Items::new(), false)),
        Err(IndexError::TreeNotLoaded(_)) => Ok((Items::new(), opts.with_unknown)),
        Err(e) => Err(e),
    }
}

fn diff_levels(
    old: Option<&dyn BaseDataIndex>,
    new: Option<&dyn BaseDataIndex>,
    opts: &DiffOptions,
) -> Result<Vec<Change>, IndexError> {
    let mut ret = Vec::new();
    let mut todo: VecDeque<(DataIndexKey, Option<DataIndexEntry>, Option<DataIndexEntry>)> =
        VecDeque::from([(Vec::new(), None, None)]);

    while let Some((dirkey, old_direntry, new_direntry)) = todo.pop_front() {
        let (old_items, old_unknown) = get_items(old, &dirkey, old_direntry.as_ref(), opts)?;
        let (new_items, new_unknown) = get_items(new, &dirkey, new_direntry.as_ref(), opts)?;
        let unknown = old_unknown || new_unknown;

        let keys: BTreeSet<&DataIndexKey> = old_items.keys().chain(new_items.keys()).collect();
        for key in keys {
            let old_info = old_items.get(key);
            let new_info = new_items.get(key);
            let old_entry = old_info.and_then(|i| i.entry.clone());
            let new_entry = new_info.and_then(|i| i.entry.clone());

            let typ = diff_entry(old_entry.as_ref(), new_entry.as_ref(), opts, unknown);

            if old_info.is_some_and(EntryInfo::is_dir) || new_info.is_some_and(EntryInfo::is_dir) {
                todo.push_back((key.clone(), old_entry.clone(), new_entry.clone()));
            }

            if old_entry.is_none() && new_entry.is_none() {
                continue;
            }
            if typ == ChangeKind::Unchanged && !opts.with_unchanged {
                continue;
            }
            ret.push(Change {
                typ,
                old: old_entry,
                new: new_entry,
            });
        }
    }
    Ok(ret)
}

/// Pair each added entry with the first deleted entry (by key) that has
/// the same hash.
fn detect_renames(changes: Vec<Change>) -> Vec<Change> {
    let mut ret = Vec::new();
    let mut added = Vec::new();
    let mut deleted = Vec::new();
    for change in changes {
        match change.typ {
            ChangeKind::Add => added.push(change),
            ChangeKind::Delete => deleted.push(change),
            _ => ret.push(change),
        }
    }
    added.sort_by(|a, b| a.key().cmp(&b.key()));
    deleted.sort_by(|a, b| a.key().cmp(&b.key()));

    for change in added {
        let Some(hash_info) = change.new.as_ref().and_then(|e| e.hash_info.as_ref()) else {
            ret.push(change);
            continue;
        };
        let found = deleted.iter().position(|d| {
            d.old
                .as_ref()
                .and_then(|e| e.hash_info.as_ref())
                .is_some_and(|h| h == hash_info)
        });
        match found {
            Some(idx) => {
                let old = deleted.remove(idx).old;
                ret.push(Change {
                    typ: ChangeKind::Rename,
                    old,
                    new: change.new,
                });
            }
            None => ret.push(change),
        }
    }
    ret.extend(deleted);
    ret
}

/// Changes from `old` to `new`. A missing side counts as empty.
pub fn diff(
    old: Option<&dyn BaseDataIndex>,
    new: Option<&dyn BaseDataIndex>,
    opts: &DiffOptions,
) -> Result<Vec<Change>, IndexError> {
    let changes = diff_levels(old, new, opts)?;
    if opts.with_renames && old.is_some() && new.is_some() && !opts.meta_only {
        return Ok(detect_renames(changes));
    }
    Ok(changes)
}
