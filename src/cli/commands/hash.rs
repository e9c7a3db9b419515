//! hash command - Compute the checksum of a file

use std::io;
use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::Context;
use crate::hashfile::hash::{file_hash, hash_reader};

/// Print `<name>: <value>` for `file`, or for stdin when `file` is `-`.
pub fn hash(ctx: &Context, file: &Path, name: &str) -> Result<()> {
    let value = if file == Path::new("-") {
        hash_reader(io::stdin().lock(), name)?
    } else {
        let path = ctx.resolve(file)?;
        file_hash(&path, name).with_context(|| format!("failed to hash '{}'", path.display()))?
    };
    println!("{name}: {value}");
    Ok(())
}
