//! init command - Create a data repository

use anyhow::Result;

use crate::cli::Context;
use crate::core::repo::Repo;
use crate::ui::output;

/// Create the control directory in the working directory.
pub fn init(ctx: &Context, force: bool) -> Result<()> {
    let root = ctx.cwd()?;
    let repo = Repo::init(&root, force)?;
    output::print(
        format!(
            "Initialized data repository in {}",
            repo.control_dir().display()
        ),
        ctx.verbosity(),
    );
    Ok(())
}
