//! hashfile::transfer
//!
//! Copy objects between stores. Trees are only written once every entry
//! they reference made it across, so a present tree always implies present
//! contents.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, error};

use super::db::{HashFileDB, ObjectDbIndex, ObjectStore, OdbError};
use super::status::{compare_status, CompareOptions, CompareStatusResult};
use super::tree::Tree;
use crate::core::hash_info::HashInfo;

/// "Too many open files": retrying other objects would only fail again.
const EMFILE: i32 = 24;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Odb(#[from] OdbError),

    /// Rejected by the caller's status check.
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferResult {
    pub transferred: BTreeSet<HashInfo>,
    pub failed: BTreeSet<HashInfo>,
}

pub type ValidateStatus<'a> = &'a dyn Fn(&CompareStatusResult) -> Result<(), TransferError>;

#[derive(Clone, Copy)]
pub struct TransferOptions<'a> {
    /// Hardlink files into the destination when possible.
    pub hardlink: bool,
    pub shallow: bool,
    pub src_index: Option<&'a dyn ObjectDbIndex>,
    pub dest_index: Option<&'a dyn ObjectDbIndex>,
    /// Extra place to look for trees.
    pub cache_odb: Option<&'a dyn ObjectStore>,
    pub validate_status: Option<ValidateStatus<'a>>,
}

impl Default for TransferOptions<'_> {
    fn default() -> Self {
        Self {
            hardlink: false,
            shallow: true,
            src_index: None,
            dest_index: None,
            cache_odb: None,
            validate_status: None,
        }
    }
}

/// Copy `obj_ids` from `src` to `dest`, skipping objects `dest` already has.
pub fn transfer(
    src: &dyn ObjectStore,
    dest: &HashFileDB,
    obj_ids: &BTreeSet<HashInfo>,
    opts: &TransferOptions<'_>,
) -> Result<TransferResult, TransferError> {
    debug!(
        "Preparing to transfer data from '{}' to '{}'",
        src.location(),
        dest.location()
    );
    if src.location() == dest.location() {
        return Ok(TransferResult::default());
    }

    let status = compare_status(
        src,
        dest,
        obj_ids,
        &CompareOptions {
            check_deleted: false,
            shallow: opts.shallow,
            src_index: opts.src_index,
            dest_index: opts.dest_index,
            cache_odb: opts.cache_odb,
        },
    )?;

    if let Some(validate) = opts.validate_status {
        validate(&status)?;
    }

    if status.new.is_empty() {
        return Ok(TransferResult::default());
    }

    let failed = do_transfer(src, dest, &status.new, &status.missing, opts)?;
    Ok(TransferResult {
        transferred: status.new.difference(&failed).cloned().collect(),
        failed,
    })
}

fn find_tree(odbs: &[Option<&dyn ObjectStore>], hash_info: &HashInfo) -> Option<Tree> {
    odbs.iter()
        .flatten()
        .find_map(|odb| Tree::load(*odb, hash_info).ok())
}

/// Returns the objects that failed to transfer.
fn do_transfer(
    src: &dyn ObjectStore,
    dest: &HashFileDB,
    obj_ids: &BTreeSet<HashInfo>,
    missing_ids: &BTreeSet<HashInfo>,
    opts: &TransferOptions<'_>,
) -> Result<BTreeSet<HashInfo>, OdbError> {
    let (dir_ids, mut file_ids): (Vec<&HashInfo>, BTreeSet<HashInfo>) = {
        let (dirs, files): (Vec<&HashInfo>, Vec<&HashInfo>) =
            obj_ids.iter().partition(|h| h.is_dir());
        (dirs, files.into_iter().cloned().collect())
    };
    let mut failed = BTreeSet::new();
    let mut succeeded_dirs: Vec<Tree> = Vec::new();

    for dir_hash in dir_ids {
        let Some(tree) = find_tree(&[opts.cache_odb, Some(src)], dir_hash) else {
            return Err(OdbError::NotFound(dir_hash.to_string()));
        };

        let entry_ids: BTreeSet<HashInfo> = tree.iter().map(|(_, _, hi)| hi.clone()).collect();
        let bound: BTreeSet<HashInfo> = file_ids.intersection(&entry_ids).cloned().collect();
        file_ids.retain(|h| !entry_ids.contains(h));

        debug!("transfer dir: {} with {} files", dir_hash, bound.len());

        let dir_fails = add(src, dest, &bound, opts.hardlink)?;
        if !dir_fails.is_empty() {
            debug!(
                "failed to upload full contents of '{}', aborting .dir file upload",
                dir_hash
            );
            failed.extend(dir_fails);
            failed.insert(dir_hash.clone());
        } else if !entry_ids.is_disjoint(missing_ids) {
            // Push what content exists, but a tree with missing entries
            // must not be stored
            debug!(
                "directory '{}' contains missing files, skipping .dir file upload",
                dir_hash
            );
        } else if !add(src, dest, &[dir_hash.clone()].into(), opts.hardlink)?.is_empty() {
            failed.insert(dir_hash.clone());
        } else {
            succeeded_dirs.push(tree);
        }
    }

    failed.extend(add(src, dest, &file_ids, opts.hardlink)?);
    if !failed.is_empty() {
        if let Some(index) = opts.src_index {
            index.clear()?;
        }
        return Ok(failed);
    }

    if let Some(index) = opts.dest_index {
        for tree in &succeeded_dirs {
            let Some(oid) = tree.oid() else {
                continue;
            };
            let files: BTreeSet<String> = tree
                .iter()
                .filter_map(|(_, _, hi)| hi.value().map(String::from))
                .collect();
            debug!(
                "Indexing pushed dir '{}' with '{}' nested files",
                oid,
                files.len()
            );
            index.update(&[oid.to_string()], &files.into_iter().collect::<Vec<_>>())?;
        }
    }
    Ok(BTreeSet::new())
}

fn add(
    src: &dyn ObjectStore,
    dest: &HashFileDB,
    hash_infos: &BTreeSet<HashInfo>,
    hardlink: bool,
) -> Result<BTreeSet<HashInfo>, OdbError> {
    let mut failed = BTreeSet::new();
    for hash_info in hash_infos {
        let oid = hash_info.value().unwrap_or_default();
        let res = src
            .source(oid)
            .and_then(|blob| dest.add_blob(&blob, oid, hardlink));
        if let Err(e) = res {
            if e.raw_os_error() == Some(EMFILE) {
                return Err(e);
            }
            error!("failed to transfer '{}': {}", oid, e);
            failed.insert(HashInfo::new(src.hash_name(), oid));
        }
    }
    Ok(failed)
}
