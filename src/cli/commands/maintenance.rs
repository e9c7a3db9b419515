//! count-objects, fsck and gc commands - Whole-database maintenance

use std::collections::BTreeSet;
use std::fs;

use anyhow::Result;

use super::from_shortoid;
use crate::cli::{Context, Exit};
use crate::core::hash_info::HashInfo;
use crate::hashfile::db::ObjectStore;
use crate::hashfile::gc::gc as gc_objects;
use crate::ui::output::{self, format_sizeof};

/// Print the number of objects and their total size.
pub fn count_objects(ctx: &Context) -> Result<()> {
    let odb = ctx.repo()?.odb(None);
    let mut count = 0usize;
    let mut total = 0u64;
    for oid in odb.all()? {
        let path = odb.oid_to_path(&oid);
        total += fs::metadata(&path)?.len();
        count += 1;
    }
    println!("{count} objects, {} size", format_sizeof(total));
    Ok(())
}

/// Verify the hash of every object. Corrupted objects are reported and
/// removed, and the command fails.
pub fn fsck(ctx: &Context) -> Result<()> {
    let repo = ctx.repo()?;
    let _lock = repo.lock()?;
    let odb = repo.odb(None);
    let mut failed = false;
    for oid in odb.all()? {
        if let Err(e) = odb.check(&oid, true) {
            println!("{e}");
            failed = true;
        }
    }
    if failed {
        return Err(Exit(1).into());
    }
    Ok(())
}

/// Remove every object not reachable from `used`.
pub fn gc(ctx: &Context, used: &[String], shallow: bool) -> Result<()> {
    let repo = ctx.repo()?;
    let _lock = repo.lock()?;
    let odb = repo.odb(None);

    let mut used_objs = BTreeSet::new();
    for oid in used {
        let oid = from_shortoid(&odb, oid)?;
        used_objs.insert(HashInfo::new(odb.hash_name(), oid));
    }

    let before = odb.all()?.len();
    if gc_objects(&odb, &used_objs, None, shallow)? {
        let removed = before.saturating_sub(odb.all()?.len());
        output::print(format!("Removed {removed} objects"), ctx.verbosity());
    } else {
        output::print("No unused objects", ctx.verbosity());
    }
    Ok(())
}
