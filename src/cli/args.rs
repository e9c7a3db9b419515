//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if in that directory
//! - `--debug`: Enable debug logging
//! - `--interactive` / `--no-interactive`: Control prompts
//! - `--quiet` / `-q`: Minimal output
//!
//! Arguments naming an object accept any unambiguous prefix of its oid, or
//! `-` to read the oid from stdin.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::bench::DEFAULT_MAX_REGRESSION;
use crate::hashfile::hash::ALGORITHMS;
use crate::hashfile::link::LinkType;

const SIZE_HELP: &str = "Human readable size, eg: '1kb', '100Mb', '10GB' etc";

/// dvc-data - content-addressed data management and its testing tool
#[derive(Parser, Debug)]
#[command(name = "dvc-data")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if dvc-data was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output; implies --no-interactive
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable interactive prompts
    #[arg(long = "interactive", global = true, conflicts_with = "no_interactive")]
    pub interactive_flag: bool,

    /// Disable interactive prompts
    #[arg(long, global = true)]
    pub no_interactive: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }

    /// Determine if interactive mode is enabled.
    ///
    /// Returns true if:
    /// - `--interactive` was explicitly set, OR
    /// - Neither `--no-interactive` nor `--quiet` was set AND stdin is a TTY
    pub fn interactive(&self) -> bool {
        if self.interactive_flag {
            true
        } else if self.no_interactive || self.quiet {
            false
        } else {
            std::io::stdin().is_terminal()
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a data repository in the current directory
    Init {
        /// Reinitialize an existing repository
        #[arg(long)]
        force: bool,
    },

    /// Compute checksum of the file
    Hash {
        /// File to hash, or '-' for stdin
        file: PathBuf,

        /// Hash algorithm
        #[arg(short, long, default_value = "md5", value_parser = clap::builder::PossibleValuesParser::new(ALGORITHMS.iter().copied()))]
        name: String,
    },

    /// Generate sparse file
    Gensparse {
        file: PathBuf,
        #[arg(help = SIZE_HELP)]
        size: String,
    },

    /// Generate file with random contents
    Genrand {
        file: PathBuf,
        #[arg(help = SIZE_HELP)]
        size: String,
    },

    /// Generate a random tree structure
    #[command(after_help = "\
EXAMPLES:
    dvc-data gentree dataset 10000
    dvc-data gentree dataset 10000 1Gb
    dvc-data gentree dataset 10000 --depth 5")]
    Gentree {
        path: PathBuf,

        /// Approximate number of files
        num: usize,

        /// Approximate total size of the tree
        #[arg(default_value = "0", help = SIZE_HELP)]
        size: String,

        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u32).range(1..))]
        depth: u32,

        #[arg(long, default_value_t = 0)]
        seed: u64,
    },

    /// Oid to path
    O2p { oid: String },

    /// Path to oid
    P2o {
        /// Object path, or '-' for stdin
        path: PathBuf,
    },

    /// Provide content of the objects
    Cat {
        oid: String,

        /// Verify the object instead of printing it
        #[arg(short, long)]
        check: bool,
    },

    /// Build and optionally write object to the database
    Build {
        /// File or directory to build, or '-' for stdin
        path: PathBuf,

        #[arg(short, long)]
        write: bool,

        /// Only write the top-level object
        #[arg(long)]
        shallow: bool,
    },

    /// List objects in a tree
    #[command(visible_alias = "ls-tree")]
    Ls { oid: String },

    /// Show various types of objects
    Show { oid: String },

    /// Summarize disk usage by an object
    Du { oid: String },

    /// Remove object from the ODB
    Rm { oid: String },

    /// Count objects and their disk consumption
    CountObjects,

    /// Verify objects in the database
    Fsck,

    /// Diff two objects in the database
    Diff {
        oid1: String,
        oid2: String,

        /// Also list unchanged entries
        #[arg(long)]
        unchanged: bool,

        /// Report entries missing from the cache
        #[arg(long)]
        check_cache: bool,

        /// With --check-cache, also verify object hashes
        #[arg(long)]
        check_hash: bool,
    },

    /// Check object link
    CheckLink {
        path: PathBuf,

        /// Object database to match hardlinks against
        #[arg(long)]
        object_dir: Option<PathBuf>,
    },

    /// Checkout from the object into a given path
    #[command(long_about = "Checkout from the object into a given path.\n\n\
        Files that differ from the object are removed first. Unless --force is \
        given, removing data that is not in the cache asks for confirmation.")]
    Checkout {
        oid: String,
        path: PathBuf,

        /// Recreate links even for unchanged files
        #[arg(long)]
        relink: bool,

        /// Remove modified files without asking
        #[arg(long)]
        force: bool,

        /// Link types to try, in order
        #[arg(long = "type", default_value = "copy")]
        types: Vec<LinkType>,
    },

    /// Remove objects that are not in use
    Gc {
        /// Objects to keep (trees keep their entries)
        #[arg(long = "used", value_name = "OID")]
        used: Vec<String>,

        /// Do not keep the entries of used trees
        #[arg(long)]
        shallow: bool,
    },

    /// Work with the data index
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Compare two benchmark result files
    #[command(name = "bench-compare")]
    BenchCompare {
        base: PathBuf,
        head: PathBuf,

        /// Largest accepted increase of a mean, as a fraction
        #[arg(long, default_value_t = DEFAULT_MAX_REGRESSION)]
        max_regression: f64,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
pub enum IndexAction {
    /// List objects in the index
    Ls {
        #[arg(default_value = "")]
        path: String,

        /// Index database (defaults to the repository's)
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_checkout_types() {
        let cli = Cli::try_parse_from([
            "dvc-data", "checkout", "abc", "out", "--type", "hardlink", "--type", "copy",
        ])
        .unwrap();
        match cli.command {
            Command::Checkout { types, .. } => {
                assert_eq!(types, vec![LinkType::Hardlink, LinkType::Copy]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn ls_tree_alias() {
        let cli = Cli::try_parse_from(["dvc-data", "ls-tree", "abc"]).unwrap();
        assert!(matches!(cli.command, Command::Ls { .. }));
    }

    #[test]
    fn rejects_unknown_hash() {
        assert!(Cli::try_parse_from(["dvc-data", "hash", "-n", "crc32", "f"]).is_err());
    }
}
