//! core::paths
//!
//! Centralized path routing for repository storage locations.
//!
//! # Storage Layout
//!
//! All repository data lives under the control directory (`<root>/.dvc`
//! unless `$DVC_DIR` says otherwise):
//! - `config.toml` - Repository configuration
//! - `cache/` - Object database (`<oid[0:2]>/<oid[2:]>`)
//! - `tmp/` - Scratch space owned by the tool
//!   - `tmp/lock` - Exclusive lock file
//!   - `tmp/hashes/local/` - State database of computed hashes
//!   - `tmp/links/` - State database of checked out links
//!   - `tmp/index/` - Object database indexes
//!   - `tmp/index/data/db.jsonl` - Serialized data index
//!
//! # Example
//!
//! ```
//! use dvc_data::core::paths::DataPaths;
//! use std::path::PathBuf;
//!
//! let paths = DataPaths::new(PathBuf::from("/repo"), PathBuf::from("/repo/.dvc"));
//!
//! assert_eq!(paths.object_dir(), PathBuf::from("/repo/.dvc/cache"));
//! assert_eq!(paths.lock_path(), PathBuf::from("/repo/.dvc/tmp/lock"));
//! ```

use std::path::{Path, PathBuf};

/// Name of the control directory under the repository root.
pub const CONTROL_DIR_NAME: &str = ".dvc";

/// Environment variable that overrides the control directory.
pub const CONTROL_DIR_ENV: &str = "DVC_DIR";

/// Path routing for a data repository.
///
/// No code outside this module should compute `*.join(".dvc")` paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// Repository root (the directory containing the control dir).
    pub root: PathBuf,

    /// Control directory, normally `<root>/.dvc`.
    pub control_dir: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf, control_dir: PathBuf) -> Self {
        Self { root, control_dir }
    }

    /// Paths for `root`, honouring `$DVC_DIR`.
    pub fn for_root(root: &Path) -> Self {
        let control_dir = std::env::var_os(CONTROL_DIR_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join(CONTROL_DIR_NAME));
        Self::new(root.to_path_buf(), control_dir)
    }

    // =========================================================================
    // Control directory layout
    // =========================================================================

    /// `<control_dir>/tmp`.
    pub fn tmp_dir(&self) -> PathBuf {
        self.control_dir.join("tmp")
    }

    /// `<control_dir>/cache`.
    pub fn object_dir(&self) -> PathBuf {
        self.control_dir.join("cache")
    }

    /// `<control_dir>/config.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.control_dir.join("config.toml")
    }

    /// `<control_dir>/tmp/lock`.
    pub fn lock_path(&self) -> PathBuf {
        self.tmp_dir().join("lock")
    }

    /// `<control_dir>/tmp/hashes/local`.
    pub fn hashes_dir(&self) -> PathBuf {
        self.tmp_dir().join("hashes").join("local")
    }

    /// `<control_dir>/tmp/links`.
    pub fn links_dir(&self) -> PathBuf {
        self.tmp_dir().join("links")
    }

    /// `<control_dir>/tmp/index`.
    pub fn index_dir(&self) -> PathBuf {
        self.tmp_dir().join("index")
    }

    /// `<control_dir>/tmp/index/data/db.jsonl`.
    pub fn data_index_path(&self) -> PathBuf {
        self.index_dir().join("data").join("db.jsonl")
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn control_dir(&self) -> &Path {
        &self.control_dir
    }

    /// Ensure the control directory structure exists.
    ///
    /// Creates the control dir, `tmp/` and `cache/` if needed.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.control_dir)?;
        std::fs::create_dir_all(self.tmp_dir())?;
        std::fs::create_dir_all(self.object_dir())?;
        Ok(())
    }
}
