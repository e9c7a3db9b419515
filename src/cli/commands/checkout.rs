//! checkout command - Materialize an object in the workspace

use std::path::Path;

use anyhow::Result;

use super::from_shortoid;
use crate::cli::{Context, Exit};
use crate::hashfile::checkout::{checkout as checkout_object, CheckoutError, CheckoutOptions};
use crate::hashfile::db::ObjectStore;
use crate::hashfile::link::LinkType;
use crate::hashfile::load;
use crate::ui::prompts;

/// Check out `oid` at `path`, linking files from the cache with the first
/// of `types` that works.
pub fn checkout(
    ctx: &Context,
    oid: &str,
    path: &Path,
    relink: bool,
    force: bool,
    types: Vec<LinkType>,
) -> Result<()> {
    let repo = ctx.repo()?;
    let _lock = repo.lock()?;
    let odb = repo.odb(Some(types));
    let oid = from_shortoid(&odb, oid)?;
    let obj = load(&odb, &odb.get(&oid).hash_info)?;
    let path = ctx.resolve(path)?;

    let interactive = ctx.interactive && repo.config().interactive();
    let prompt = move |msg: &str| prompts::confirm(msg, false, interactive).unwrap_or(false);
    let opts = CheckoutOptions {
        force,
        relink,
        quiet: ctx.quiet,
        state: Some(odb.state()),
        prompt: Some(&prompt),
        ..CheckoutOptions::default()
    };

    let result = checkout_object(&path, Some(&obj), &odb, &opts);
    odb.state().close()?;
    match result {
        Ok(_) => Ok(()),
        Err(CheckoutError::Failed(paths)) => {
            for failed in paths {
                eprintln!("failed to checkout '{}'", failed.display());
            }
            Err(Exit(1).into())
        }
        Err(e) => Err(e.into()),
    }
}
