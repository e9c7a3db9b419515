//! diff command - Compare two objects in the database

use anyhow::Result;

use super::from_shortoid;
use crate::cli::Context;
use crate::core::hash_info::HASH_DIR_SUFFIX;
use crate::hashfile::db::ObjectStore;
use crate::hashfile::diff::{diff_with, TreeEntry};
use crate::hashfile::load;

/// `path (oid)` with file oids shortened to nine characters.
fn describe(entry: &TreeEntry) -> String {
    let path = if entry.key.is_empty() {
        "ROOT".to_string()
    } else {
        entry.key.join("/")
    };
    let oid = entry.oid.as_ref().and_then(|h| h.value()).unwrap_or_default();
    let oid = if oid.ends_with(HASH_DIR_SUFFIX) {
        oid
    } else {
        oid.get(..9).unwrap_or(oid)
    };
    let missing = if entry.in_cache { "" } else { ", missing" };
    format!("{path} ({oid}{missing})")
}

/// Print the changes between two objects, one `state: info` line each.
///
/// Entries only count as missing with `check_cache`. Unchanged entries are
/// listed with `unchanged`, or when they are missing.
pub fn diff(
    ctx: &Context,
    oid1: &str,
    oid2: &str,
    unchanged: bool,
    check_cache: bool,
    check_hash: bool,
) -> Result<()> {
    let odb = ctx.repo()?.odb(None);
    let obj1 = odb.get(&from_shortoid(&odb, oid1)?);
    let obj2 = odb.get(&from_shortoid(&odb, oid2)?);
    let old = load(&odb, &obj1.hash_info)?;
    let new = load(&odb, &obj2.hash_info)?;

    let result = diff_with(Some(&old), Some(&new), |hash_info| {
        !check_cache
            || hash_info
                .value()
                .is_some_and(|oid| odb.check(oid, check_hash).is_ok())
    });

    for (state, changes) in result.sections() {
        for change in changes {
            if state == "unchanged" && !unchanged && change.new.in_cache {
                continue;
            }
            let info = match state {
                "modified" => format!("{} -> {}", describe(&change.old), describe(&change.new)),
                "added" => describe(&change.new),
                _ => describe(&change.old),
            };
            println!("{state}: {info}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash_info::HashInfo;

    #[test]
    fn describes_entries() {
        let file = TreeEntry {
            in_cache: true,
            key: vec!["data".into(), "foo".into()],
            meta: None,
            oid: Some(HashInfo::new("md5", "acbd18db4cc2f85cedef654fccc4a4d8")),
        };
        assert_eq!(describe(&file), "data/foo (acbd18db4)");

        let root = TreeEntry {
            in_cache: false,
            key: Vec::new(),
            meta: None,
            oid: Some(HashInfo::new("md5", "1f69c66028c35037e8bf67e5bc4ceb6a.dir")),
        };
        assert_eq!(
            describe(&root),
            "ROOT (1f69c66028c35037e8bf67e5bc4ceb6a.dir, missing)"
        );
    }
}
