//! cli
//!
//! Command-line interface layer for dvc-data.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install the log subscriber
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. Handlers open the repository through
//! [`Context`], call into [`crate::hashfile`] and [`crate::index`], and
//! format the results.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::core::repo::Repo;
use crate::ui::output::Verbosity;

/// Environment variable holding a log filter, e.g. `dvc_data=debug`.
pub const LOG_ENV: &str = "DVC_DATA_LOG";

/// Ends the process with the given status after the command has already
/// reported the problem itself.
#[derive(Debug, Error)]
#[error("exit status {0}")]
pub struct Exit(pub u8);

/// Execution context shared by command handlers.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub cwd: Option<PathBuf>,
    pub debug: bool,
    pub quiet: bool,
    pub interactive: bool,
}

impl Context {
    pub fn cwd(&self) -> Result<PathBuf> {
        match &self.cwd {
            Some(cwd) => Ok(cwd.clone()),
            None => std::env::current_dir().context("failed to determine the current directory"),
        }
    }

    /// `path` relative to the working directory.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        Ok(self.cwd()?.join(path))
    }

    /// The repository containing the working directory.
    pub fn repo(&self) -> Result<Repo> {
        Ok(Repo::discover(&self.cwd()?)?)
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.debug)
    }
}

/// Route `tracing` output to stderr. `$DVC_DATA_LOG` wins over the flags.
fn init_logging(debug: bool, quiet: bool) {
    let default = if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when running under a test harness
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();
    init_logging(cli.debug, cli.quiet);

    let ctx = Context {
        cwd: cli.cwd.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
        interactive: cli.interactive(),
    };

    commands::dispatch(cli.command, &ctx)
}
