//! index command - Inspect a stored data index

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::index::data_index::{BaseDataIndex, DataIndex, EntryInfo};
use crate::index::serialize::read_db;
use crate::index::{path_to_key, DataIndexKey, IndexError};
use crate::ui::output::{format_sizeof, print_table};

const HEADER: [&str; 8] = ["exec", "size", "version_id", "hash", "value", "loaded", "files", ""];

fn build_row(info: &EntryInfo, name: &str, prefix: &str) -> Vec<String> {
    let entry = info.entry.as_ref();
    let meta = entry.and_then(|e| e.meta.as_ref());
    let exec = if info.isexec { "x" } else { "" };
    let size = match info.size {
        Some(size) if !info.is_dir() => format_sizeof(size),
        _ => String::new(),
    };
    let (hash_name, value) = info.hash().unwrap_or_default();
    let unloaded = entry.is_some_and(|e| e.loaded.is_none() && e.hash_info.is_some());
    let loaded = if info.is_dir() && unloaded {
        "no"
    } else {
        ""
    };
    let nfiles = meta
        .and_then(|m| m.nfiles)
        .map(|n| n.to_string())
        .unwrap_or_default();
    let suffix = if info.is_dir() { "/" } else { "" };
    vec![
        exec.to_string(),
        size,
        String::new(),
        hash_name.to_string(),
        value.to_string(),
        loaded.to_string(),
        nfiles,
        format!("{prefix}{name}{suffix}"),
    ]
}

/// Rows for the children of `key`, drawn as a tree below `indent`.
fn collect_rows(
    index: &DataIndex,
    key: &[String],
    indent: &str,
    rows: &mut Vec<Vec<String>>,
) -> Result<()> {
    let children = match index.ls(key) {
        Ok(children) => children,
        Err(IndexError::TreeNotLoaded(_)) => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let count = children.len();
    for (i, (child, info)) in children.into_iter().enumerate() {
        let last = i + 1 == count;
        let (connector, extension) = if last {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        let name = child.last().map(String::as_str).unwrap_or_default();
        rows.push(build_row(&info, name, &format!("{indent}{connector}")));
        if info.is_dir() {
            collect_rows(index, &child, &format!("{indent}{extension}"), rows)?;
        }
    }
    Ok(())
}

/// Print the index stored in `db` (the repository's index by default) as a
/// tree rooted at `path`.
pub fn index_ls(ctx: &Context, path: &str, db: Option<&Path>) -> Result<()> {
    let db = match db {
        Some(db) => ctx.resolve(db)?,
        None => ctx.repo()?.paths().data_index_path(),
    };
    let index = read_db(&db).with_context(|| format!("failed to read index '{}'", db.display()))?;

    let key: DataIndexKey = path_to_key(path);
    let info = if key.is_empty() && !index.contains_key(&key) {
        index.info_from_entry(&key, None)
    } else {
        index.info(&key)?
    };
    let name = if key.is_empty() {
        String::new()
    } else {
        key.join("/")
    };

    let mut rows: Vec<Vec<String>> = vec![HEADER.iter().map(|h| h.to_string()).collect()];
    let mut root = build_row(&info, &name, "");
    if key.is_empty() {
        if let Some(last) = root.last_mut() {
            *last = "/".to_string();
        }
    }
    rows.push(root);
    if info.is_dir() {
        collect_rows(&index, &key, "", &mut rows)?;
    }
    print_table(&rows);
    Ok(())
}
