//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Opens the repository and its object database
//! 3. Formats and displays output
//!
//! Handlers that write to the object database hold the repository lock
//! for their whole run.

mod bench_cmd;
mod build;
mod check_link;
mod checkout;
mod completion;
mod diff;
mod generate;
mod hash;
mod index_cmd;
mod init;
mod maintenance;
mod objects;

// Re-export command functions for testing and direct invocation
pub use bench_cmd::bench_compare;
pub use build::build;
pub use check_link::check_link;
pub use checkout::checkout;
pub use completion::completion;
pub use diff::diff;
pub use generate::{genrand, gensparse, gentree};
pub use hash::hash;
pub use index_cmd::index_ls;
pub use init::init;
pub use maintenance::{count_objects, fsck, gc};
pub use objects::{cat, du, ls, o2p, p2o, rm, show};

use std::io::{self, BufRead};

use anyhow::Result;

use crate::cli::args::{Command, IndexAction};
use crate::cli::{Context, Exit};
use crate::hashfile::db::{HashFileDB, OdbError};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Init { force } => init::init(ctx, force),
        Command::Hash { file, name } => hash::hash(ctx, &file, &name),
        Command::Gensparse { file, size } => generate::gensparse(ctx, &file, &size),
        Command::Genrand { file, size } => generate::genrand(ctx, &file, &size),
        Command::Gentree {
            path,
            num,
            size,
            depth,
            seed,
        } => generate::gentree(ctx, &path, num, &size, depth, seed),

        // Object database inspection
        Command::O2p { oid } => objects::o2p(ctx, &oid),
        Command::P2o { path } => objects::p2o(ctx, &path),
        Command::Cat { oid, check } => objects::cat(ctx, &oid, check),
        Command::Ls { oid } => objects::ls(ctx, &oid),
        Command::Show { oid } => objects::show(ctx, &oid),
        Command::Du { oid } => objects::du(ctx, &oid),
        Command::Rm { oid } => objects::rm(ctx, &oid),
        Command::CountObjects => maintenance::count_objects(ctx),
        Command::Fsck => maintenance::fsck(ctx),
        Command::Gc { used, shallow } => maintenance::gc(ctx, &used, shallow),

        // Building, comparing and materializing objects
        Command::Build {
            path,
            write,
            shallow,
        } => build::build(ctx, &path, write, shallow),
        Command::Diff {
            oid1,
            oid2,
            unchanged,
            check_cache,
            check_hash,
        } => diff::diff(ctx, &oid1, &oid2, unchanged, check_cache, check_hash),
        Command::CheckLink { path, object_dir } => {
            check_link::check_link(ctx, &path, object_dir.as_deref())
        }
        Command::Checkout {
            oid,
            path,
            relink,
            force,
            types,
        } => checkout::checkout(ctx, &oid, &path, relink, force, types),

        Command::Index { action } => match action {
            IndexAction::Ls { path, db } => index_cmd::index_ls(ctx, &path, db.as_deref()),
        },
        Command::BenchCompare {
            base,
            head,
            max_regression,
        } => bench_cmd::bench_compare(ctx, &base, &head, max_regression),
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// First line of stdin, trimmed.
pub(crate) fn read_stdin_line() -> Result<String> {
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Resolve a possibly abbreviated oid (`-` reads it from stdin).
///
/// Unknown and ambiguous prefixes are reported on stderr and end the
/// process with status 1.
pub(crate) fn from_shortoid(odb: &HashFileDB, oid: &str) -> Result<String> {
    let oid = if oid == "-" {
        read_stdin_line()?
    } else {
        oid.to_string()
    };
    match odb.exists_prefix(&oid) {
        Ok(full) => Ok(full),
        Err(OdbError::NotFound(_)) => {
            eprintln!("Not a valid oid='{oid}'");
            Err(Exit(1).into())
        }
        Err(OdbError::Ambiguous(_)) => {
            eprintln!("Ambiguous oid='{oid}'");
            Err(Exit(1).into())
        }
        Err(e) => Err(e.into()),
    }
}
