//! build command - Hash a path and optionally store it

use std::collections::BTreeSet;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::hashfile::build::{build as build_object, build_bytes, BuildOptions};
use crate::hashfile::db::ObjectStore;
use crate::hashfile::transfer::{transfer, TransferOptions};

/// Build `path` (a file, a directory or `-` for stdin) and print the
/// resulting object. With `write`, store it in the object database.
pub fn build(ctx: &Context, path: &Path, write: bool, shallow: bool) -> Result<()> {
    let repo = ctx.repo()?;
    let _lock = if write { Some(repo.lock()?) } else { None };
    let odb = repo.odb(None);
    let name = odb.hash_name().to_string();

    let (staging, _, obj) = if path == Path::new("-") {
        let mut data = Vec::new();
        io::stdin().lock().read_to_end(&mut data)?;
        build_bytes(&data, &name)?
    } else {
        let path = ctx.resolve(path)?;
        build_object(&odb, &path, &name, &BuildOptions::default())
            .with_context(|| format!("failed to build '{}'", path.display()))?
    };

    if write {
        let hash_info = obj
            .hash_info()
            .cloned()
            .context("built object has no hash")?;
        let opts = TransferOptions {
            hardlink: true,
            shallow,
            ..TransferOptions::default()
        };
        transfer(&staging, &odb, &BTreeSet::from([hash_info]), &opts)?;
    }
    odb.state().close()?;

    println!("{obj}");
    Ok(())
}
