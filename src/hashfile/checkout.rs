//! hashfile::checkout
//!
//! Materialize an object at a workspace path.
//!
//! # Flow
//!
//! 1. Build the current workspace contents (dry run) and diff them against
//!    the target object.
//! 2. Remove deleted entries. Removing data that is not in the cache needs
//!    `force` or a confirming prompt.
//! 3. Link added and modified entries from the cache with the first link
//!    type that works between the cache and the workspace.
//! 4. Record the linked files in state.
//!
//! Entries whose cache object is missing do not stop the checkout; they are
//! collected and reported together as [`CheckoutError::Failed`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

use super::build::{build, BuildError, BuildOptions};
use super::db::{HashFileDB, ObjectStore, OdbError};
use super::diff::{diff, is_root, Change, DiffResult};
use super::ignore::Ignore;
use super::link::{is_copy, test_links, LinkType};
use super::state::StateBase;
use super::Object;
use crate::core::fsutil;
use crate::core::hash_info::HashInfo;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("unable to remove '{}' without a confirmation.", .0.display())]
    Prompt(PathBuf),

    #[error("No possible cache link types for '{}'.", .0.display())]
    Link(PathBuf),

    #[error("Checkout failed")]
    Failed(Vec<PathBuf>),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Odb(#[from] OdbError),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl CheckoutError {
    fn io(path: &Path, source: io::Error) -> Self {
        CheckoutError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Confirmation callback for destructive removals.
pub type Prompt<'a> = &'a dyn Fn(&str) -> bool;

#[derive(Default, Clone, Copy)]
pub struct CheckoutOptions<'a> {
    /// Remove uncached workspace data without asking.
    pub force: bool,
    /// Re-link every entry, including unchanged ones.
    pub relink: bool,
    /// Suppress the missing-object warning.
    pub quiet: bool,
    pub ignore: Option<&'a dyn Ignore>,
    pub state: Option<&'a dyn StateBase>,
    pub prompt: Option<Prompt<'a>>,
}

/// Check out `obj` at `path` from `cache`.
///
/// Returns `Ok(true)` when the workspace changed (and this was not a
/// relink), `Ok(false)` when it was already up to date.
pub fn checkout(
    path: &Path,
    obj: Option<&Object>,
    cache: &HashFileDB,
    opts: &CheckoutOptions<'_>,
) -> Result<bool, CheckoutError> {
    let diff = workspace_diff(path, obj, cache, opts)?;

    let mut failed = Vec::new();
    if obj.is_none() {
        if !opts.quiet {
            warn!(
                "No file hash info found for '{}'. It won't be created.",
                path.display()
            );
        }
        failed.push(path.to_path_buf());
    }

    match apply(&diff, path, cache, opts) {
        Ok(()) => {}
        Err(CheckoutError::Failed(paths)) => failed.extend(paths),
        Err(e) => return Err(e),
    }

    if diff.has_changes() {
        if let Some(state) = opts.state {
            state.save_link(path);
        }
    }

    if !failed.is_empty() {
        return Err(CheckoutError::Failed(failed));
    }
    Ok(diff.has_changes() && !opts.relink)
}

fn workspace_diff(
    path: &Path,
    obj: Option<&Object>,
    cache: &HashFileDB,
    opts: &CheckoutOptions<'_>,
) -> Result<DiffResult, CheckoutError> {
    let name = obj
        .and_then(Object::hash_info)
        .and_then(HashInfo::name)
        .unwrap_or_else(|| cache.hash_name())
        .to_string();
    let build_opts = BuildOptions {
        dry_run: true,
        ignore: opts.ignore,
    };
    let old = match build(cache, path, &name, &build_opts) {
        Ok((_, _, old)) => Some(old),
        Err(BuildError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };

    let mut diff = diff(old.as_ref(), obj, cache);
    if opts.relink {
        let unchanged = std::mem::take(&mut diff.unchanged);
        diff.modified.extend(unchanged);
    } else {
        let relinks: Vec<Change> = diff
            .unchanged
            .iter()
            .filter(|c| !c.new.in_cache && !c.new.oid.as_ref().is_some_and(HashInfo::is_dir))
            .cloned()
            .collect();
        diff.modified.extend(relinks);
    }
    Ok(diff)
}

fn entry_path(path: &Path, key: &[String]) -> PathBuf {
    if is_root(key) {
        return path.to_path_buf();
    }
    key.iter().fold(path.to_path_buf(), |acc, part| acc.join(part))
}

fn apply(
    diff: &DiffResult,
    path: &Path,
    cache: &HashFileDB,
    opts: &CheckoutOptions<'_>,
) -> Result<(), CheckoutError> {
    if !diff.has_changes() {
        return Ok(());
    }

    let probe_dir = path.parent().unwrap_or(Path::new("."));
    let links = test_links(cache.cache_types(), cache.path(), probe_dir);
    if links.is_empty() {
        return Err(CheckoutError::Link(path.to_path_buf()));
    }

    for change in &diff.deleted {
        remove(&entry_path(path, &change.old.key), change.old.in_cache, opts)?;
    }

    let mut failed = Vec::new();
    let mut hashes_to_update = Vec::new();
    for change in diff.added.iter().chain(&diff.modified) {
        let target = entry_path(path, &change.new.key);
        let Some(new_oid) = change.new.oid.as_ref() else {
            continue;
        };
        if new_oid.is_dir() {
            fs::create_dir_all(&target).map_err(|e| CheckoutError::io(&target, e))?;
            continue;
        }

        match checkout_file(&links, &target, change, new_oid, cache, opts) {
            Ok(()) => hashes_to_update.push((target, new_oid.clone())),
            Err(CheckoutError::Failed(paths)) => failed.extend(paths),
            Err(e) => return Err(e),
        }
    }

    if let Some(state) = opts.state {
        state.save_many(&hashes_to_update);
    }

    if !failed.is_empty() {
        return Err(CheckoutError::Failed(failed));
    }
    Ok(())
}

fn checkout_file(
    links: &[LinkType],
    path: &Path,
    change: &Change,
    new_oid: &HashInfo,
    cache: &HashFileDB,
    opts: &CheckoutOptions<'_>,
) -> Result<(), CheckoutError> {
    let cache_path = cache.oid_to_path(new_oid.value().unwrap_or_default());
    if !change.old.is_present() {
        return link(links, &cache_path, path);
    }

    let copy_first = cache.cache_types().first() == Some(&LinkType::Copy);
    if opts.relink && is_copy(path) && copy_first {
        cache.unprotect(path)?;
        return Ok(());
    }

    remove(path, change.old.in_cache, opts)?;
    link(links, &cache_path, path)?;
    // Removing a hardlink can reset the object's permissions on some filesystems
    cache.protect(&cache_path);
    Ok(())
}

/// Remove workspace data, asking first when it is not backed by the cache.
fn remove(path: &Path, in_cache: bool, opts: &CheckoutOptions<'_>) -> Result<(), CheckoutError> {
    if !opts.force && !in_cache {
        if fs::symlink_metadata(path).is_err() {
            return Ok(());
        }
        let msg = format!(
            "file/directory '{}' is going to be removed. Are you sure you want to proceed?",
            path.display()
        );
        if !opts.prompt.is_some_and(|prompt| prompt(&msg)) {
            return Err(CheckoutError::Prompt(path.to_path_buf()));
        }
    }
    fsutil::remove(path).map_err(|e| CheckoutError::io(path, e))
}

/// Place `from` at `to` with the first link type that succeeds.
fn link(links: &[LinkType], from: &Path, to: &Path) -> Result<(), CheckoutError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|e| CheckoutError::io(parent, e))?;
    }
    if !from.exists() {
        debug!("cache object '{}' is missing", from.display());
        return Err(CheckoutError::Failed(vec![to.to_path_buf()]));
    }

    for typ in links {
        match typ.link(from, to) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CheckoutError::Failed(vec![to.to_path_buf()]));
            }
            Err(e) => debug!(link = %typ, error = %e, "link attempt failed"),
        }
    }
    Err(CheckoutError::Link(to.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashfile::build::build;
    use crate::hashfile::state::State;
    use crate::hashfile::transfer::{transfer, TransferOptions};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        odb: HashFileDB,
    }

    fn setup(types: Vec<LinkType>) -> Fixture {
        let temp = TempDir::new().unwrap();
        let odb = HashFileDB::new(temp.path().join("cache")).with_cache_types(types);
        Fixture { temp, odb }
    }

    /// Build `src` into the cache and return its object.
    fn store(fx: &Fixture, src: &Path) -> Object {
        let (staging, _, obj) = build(&fx.odb, src, "md5", &BuildOptions::default()).unwrap();
        let ids: BTreeSet<HashInfo> = [obj.hash_info().unwrap().clone()].into();
        let opts = TransferOptions {
            shallow: false,
            ..TransferOptions::default()
        };
        transfer(&staging, &fx.odb, &ids, &opts).unwrap();
        obj
    }

    fn make_dir(fx: &Fixture) -> PathBuf {
        let src = fx.temp.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("foo"), "foo").unwrap();
        fs::write(src.join("sub/bar"), "bar").unwrap();
        src
    }

    #[test]
    fn checkout_directory_with_copies() {
        let fx = setup(vec![LinkType::Copy]);
        let obj = store(&fx, &make_dir(&fx));

        let ws = fx.temp.path().join("ws");
        let changed = checkout(&ws, Some(&obj), &fx.odb, &CheckoutOptions::default()).unwrap();
        assert!(changed);
        assert_eq!(fs::read_to_string(ws.join("foo")).unwrap(), "foo");
        assert_eq!(fs::read_to_string(ws.join("sub/bar")).unwrap(), "bar");
        assert!(is_copy(&ws.join("foo")));

        // Second checkout is a no-op
        let changed = checkout(&ws, Some(&obj), &fx.odb, &CheckoutOptions::default()).unwrap();
        assert!(!changed);
    }

    #[cfg(unix)]
    #[test]
    fn checkout_with_hardlinks_and_relink() {
        let fx = setup(vec![LinkType::Hardlink]);
        let obj = store(&fx, &make_dir(&fx));

        let ws = fx.temp.path().join("ws");
        checkout(&ws, Some(&obj), &fx.odb, &CheckoutOptions::default()).unwrap();
        assert!(!is_copy(&ws.join("foo")));

        let opts = CheckoutOptions {
            relink: true,
            ..CheckoutOptions::default()
        };
        assert!(!checkout(&ws, Some(&obj), &fx.odb, &opts).unwrap());
        assert!(!is_copy(&ws.join("foo")));
    }

    #[test]
    fn uncached_files_need_confirmation() {
        let fx = setup(vec![LinkType::Copy]);
        let obj = store(&fx, &make_dir(&fx));

        let ws = fx.temp.path().join("ws");
        checkout(&ws, Some(&obj), &fx.odb, &CheckoutOptions::default()).unwrap();
        fs::write(ws.join("extra"), "local only").unwrap();

        let err = checkout(&ws, Some(&obj), &fx.odb, &CheckoutOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("unable to remove '{}' without a confirmation.", ws.join("extra").display())
        );

        let deny = |_: &str| false;
        let opts = CheckoutOptions {
            prompt: Some(&deny),
            ..CheckoutOptions::default()
        };
        assert!(matches!(
            checkout(&ws, Some(&obj), &fx.odb, &opts),
            Err(CheckoutError::Prompt(_))
        ));

        let opts = CheckoutOptions {
            force: true,
            ..CheckoutOptions::default()
        };
        assert!(checkout(&ws, Some(&obj), &fx.odb, &opts).unwrap());
        assert!(!ws.join("extra").exists());
    }

    #[test]
    fn modified_file_is_restored_after_prompt() {
        let fx = setup(vec![LinkType::Copy]);
        let obj = store(&fx, &make_dir(&fx));
        let ws = fx.temp.path().join("ws");
        checkout(&ws, Some(&obj), &fx.odb, &CheckoutOptions::default()).unwrap();

        fs::write(ws.join("foo"), "changed").unwrap();
        let accept = |_: &str| true;
        let opts = CheckoutOptions {
            prompt: Some(&accept),
            ..CheckoutOptions::default()
        };
        assert!(checkout(&ws, Some(&obj), &fx.odb, &opts).unwrap());
        assert_eq!(fs::read_to_string(ws.join("foo")).unwrap(), "foo");
    }

    #[test]
    fn missing_objects_fail_at_the_end() {
        let fx = setup(vec![LinkType::Copy]);
        let src = make_dir(&fx);
        let obj = store(&fx, &src);
        fx.odb.delete("37b51d194a7513e45b56f6524f2d51f2").unwrap();

        let ws = fx.temp.path().join("ws");
        match checkout(&ws, Some(&obj), &fx.odb, &CheckoutOptions::default()) {
            Err(CheckoutError::Failed(paths)) => assert_eq!(paths, vec![ws.join("sub").join("bar")]),
            other => panic!("unexpected {:?}", other),
        }
        // Everything else was still checked out
        assert!(ws.join("foo").exists());
    }

    #[test]
    fn no_object_warns_and_fails() {
        let fx = setup(vec![LinkType::Copy]);
        let ws = fx.temp.path().join("ws");
        let opts = CheckoutOptions {
            quiet: true,
            ..CheckoutOptions::default()
        };
        match checkout(&ws, None, &fx.odb, &opts) {
            Err(CheckoutError::Failed(paths)) => assert_eq!(paths, vec![ws.clone()]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn single_file_checkout_records_state() {
        let fx = setup(vec![LinkType::Copy]);
        let src = fx.temp.path().join("foo");
        fs::write(&src, "foo").unwrap();
        let obj = store(&fx, &src);

        let state = State::new(fx.temp.path(), fx.temp.path().join("tmp"));
        let ws = fx.temp.path().join("out");
        let opts = CheckoutOptions {
            state: Some(&state),
            ..CheckoutOptions::default()
        };
        assert!(checkout(&ws, Some(&obj), &fx.odb, &opts).unwrap());
        assert_eq!(fs::read_to_string(&ws).unwrap(), "foo");
        assert_eq!(state.get(&ws).map(|(_, h)| h), obj.hash_info().cloned());
        assert_eq!(state.get_unused_links(&[]), vec!["out".to_string()]);
    }

    #[test]
    fn reflink_only_cannot_link() {
        let fx = setup(vec![LinkType::Reflink]);
        let src = fx.temp.path().join("foo");
        fs::write(&src, "foo").unwrap();
        let obj = store(&fx, &src);

        let ws = fx.temp.path().join("out");
        assert!(matches!(
            checkout(&ws, Some(&obj), &fx.odb, &CheckoutOptions::default()),
            Err(CheckoutError::Link(_))
        ));
    }
}
