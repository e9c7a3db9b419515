//! o2p, p2o, cat, ls, show, du and rm commands - Inspect single objects

use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, Result};

use super::{from_shortoid, read_stdin_line};
use crate::cli::{Context, Exit};
use crate::core::hash_info::HashInfo;
use crate::hashfile::db::{HashFileDB, ObjectStore};
use crate::hashfile::diff::root_key;
use crate::hashfile::tree::{self, Tree};
use crate::hashfile::{self, Object};
use crate::ui::output::format_sizeof;

/// Print an object-level failure and end with status 1.
fn fail(err: impl std::fmt::Display) -> anyhow::Error {
    eprintln!("{err}");
    Exit(1).into()
}

fn print_tree(tree: &Tree) {
    for (key, _, hash_info) in tree.iter() {
        println!("{}\t{}", hash_info.value().unwrap_or_default(), key.join("/"));
    }
}

fn print_object(odb: &HashFileDB, oid: &str) -> Result<()> {
    let contents = odb.read(oid)?;
    let mut out = io::stdout().lock();
    out.write_all(&contents)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Load the object `oid` names, file or tree.
fn load(odb: &HashFileDB, oid: &str) -> Result<Object> {
    hashfile::load(odb, &odb.get(oid).hash_info).map_err(fail)
}

/// Print the path of an object.
pub fn o2p(ctx: &Context, oid: &str) -> Result<()> {
    let odb = ctx.repo()?.odb(None);
    let oid = from_shortoid(&odb, oid)?;
    println!("{}", odb.oid_to_path(&oid).display());
    Ok(())
}

/// Print the oid stored at a path inside the object database.
pub fn p2o(ctx: &Context, path: &Path) -> Result<()> {
    let odb = ctx.repo()?.odb(None);
    let path = if path == Path::new("-") {
        read_stdin_line()?.into()
    } else {
        path.to_path_buf()
    };
    match odb.path_to_oid(&path) {
        Some(oid) => println!("{oid}"),
        None => println!("None"),
    }
    Ok(())
}

/// Print an object's contents, or with `check` verify its hash.
pub fn cat(ctx: &Context, oid: &str, check: bool) -> Result<()> {
    let odb = ctx.repo()?.odb(None);
    let oid = from_shortoid(&odb, oid)?;
    if check {
        return odb.check(&oid, true).map_err(fail);
    }
    print_object(&odb, &oid)
}

/// List the entries of a tree.
pub fn ls(ctx: &Context, oid: &str) -> Result<()> {
    let odb = ctx.repo()?.odb(None);
    let oid = from_shortoid(&odb, oid)?;
    let tree = Tree::load(&odb, &HashInfo::new(odb.hash_name(), oid)).map_err(fail)?;
    print_tree(&tree);
    Ok(())
}

/// List a tree or print a file object.
pub fn show(ctx: &Context, oid: &str) -> Result<()> {
    let odb = ctx.repo()?.odb(None);
    let oid = from_shortoid(&odb, oid)?;
    match load(&odb, &oid)? {
        Object::Tree(tree) => {
            print_tree(&tree);
            Ok(())
        }
        Object::File(obj) => print_object(&odb, obj.oid()),
    }
}

/// Print the disk usage of an object and everything it references.
pub fn du(ctx: &Context, oid: &str) -> Result<()> {
    let odb = ctx.repo()?.odb(None);
    let oid = from_shortoid(&odb, oid)?;
    let tree = match load(&odb, &oid)? {
        Object::Tree(tree) => tree,
        Object::File(obj) => {
            let mut tree = Tree::new();
            tree.add(root_key(), None, obj.hash_info);
            tree
        }
    };
    let total = tree::du(&odb, &tree).ok_or_else(|| anyhow!("some objects of {oid} are missing"))?;
    println!("{}", format_sizeof(total));
    Ok(())
}

/// Delete an object.
pub fn rm(ctx: &Context, oid: &str) -> Result<()> {
    let repo = ctx.repo()?;
    let _lock = repo.lock()?;
    let odb = repo.odb(None);
    let oid = from_shortoid(&odb, oid)?;
    odb.delete(&oid)?;
    Ok(())
}
