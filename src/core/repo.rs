//! core::repo
//!
//! Locating a data repository and opening its object database.
//!
//! A repository is any directory with a control directory (`.dvc`, or
//! whatever `$DVC_DIR` names). [`Repo::discover`] walks up from a start
//! directory until it finds one.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::core::config::{Config, ConfigError, RepoConfig};
use crate::core::ops::{LockError, RepoLock};
use crate::core::paths::DataPaths;
use crate::hashfile::db::HashFileDB;
use crate::hashfile::link::LinkType;
use crate::hashfile::state::State;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    NotARepo(String),

    #[error("'{}' is already a data repo", .0.display())]
    AlreadyExists(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("{}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// An opened data repository.
#[derive(Debug)]
pub struct Repo {
    paths: DataPaths,
    config: Config,
}

impl Repo {
    /// Open the repository rooted at `root`.
    ///
    /// # Errors
    ///
    /// [`RepoError::NotARepo`] when the control directory does not exist.
    pub fn new(root: &Path) -> Result<Self, RepoError> {
        let paths = DataPaths::for_root(root);
        if !paths.control_dir().is_dir() {
            return Err(RepoError::NotARepo(format!(
                "{} is not a data repo.",
                root.display()
            )));
        }
        let config = Config::load(Some(&paths))?;
        if let Some(path) = config.global_config_loaded_from() {
            debug!("global config: {}", path.display());
        }
        if let Some(path) = config.repo_config_loaded_from() {
            debug!("repo config: {}", path.display());
        }
        Ok(Self { paths, config })
    }

    /// Open the repository at `start` or the nearest ancestor that is one.
    pub fn discover(start: &Path) -> Result<Self, RepoError> {
        let start = std::path::absolute(start).map_err(|e| RepoError::Io {
            path: start.to_path_buf(),
            source: e,
        })?;
        for dir in start.ancestors() {
            match Self::new(dir) {
                Ok(repo) => {
                    debug!("found data repo at '{}'", dir.display());
                    return Ok(repo);
                }
                Err(RepoError::NotARepo(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(RepoError::NotARepo(format!(
            "No data repository was found at {}",
            start.display()
        )))
    }

    /// Create the control directory layout under `root` and open it.
    pub fn init(root: &Path, force: bool) -> Result<Self, RepoError> {
        let paths = DataPaths::for_root(root);
        if paths.control_dir().is_dir() && !force {
            return Err(RepoError::AlreadyExists(root.to_path_buf()));
        }
        paths.ensure_dirs().map_err(|e| RepoError::Io {
            path: paths.control_dir().to_path_buf(),
            source: e,
        })?;
        if !paths.config_path().exists() {
            Config::write_repo(&paths, &RepoConfig::default())?;
        }
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    pub fn control_dir(&self) -> &Path {
        self.paths.control_dir()
    }

    pub fn tmp_dir(&self) -> PathBuf {
        self.paths.tmp_dir()
    }

    pub fn object_dir(&self) -> PathBuf {
        self.paths.object_dir()
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Take the exclusive lock for a mutating operation.
    pub fn lock(&self) -> Result<RepoLock, RepoError> {
        Ok(RepoLock::acquire(&self.paths)?)
    }

    /// State database for the workspace.
    pub fn state(&self) -> State {
        State::new(self.root(), self.tmp_dir())
    }

    /// The repository's object database, configured from the repo config.
    /// `cache_types` overrides the configured link types when non-empty.
    pub fn odb(&self, cache_types: Option<Vec<LinkType>>) -> HashFileDB {
        let types = cache_types
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.config.cache_types());
        HashFileDB::new(self.object_dir())
            .with_hash_name(self.config.hash_name())
            .with_cache_types(types)
            .with_verify(self.config.verify())
            .with_shared(self.config.shared())
            .with_tmp_dir(self.tmp_dir())
            .with_state(Arc::new(self.state()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn new_requires_control_dir() {
        let temp = TempDir::new().unwrap();
        let err = Repo::new(temp.path()).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("{} is not a data repo.", temp.path().display())
        );
    }

    #[test]
    fn init_creates_layout() {
        let temp = TempDir::new().unwrap();
        let repo = Repo::init(temp.path(), false).unwrap();
        assert!(repo.object_dir().is_dir());
        assert!(repo.tmp_dir().is_dir());
        assert_eq!(repo.control_dir(), temp.path().join(".dvc"));
        assert!(repo.paths().config_path().is_file());

        assert!(matches!(
            Repo::init(temp.path(), false),
            Err(RepoError::AlreadyExists(_))
        ));
        assert!(Repo::init(temp.path(), true).is_ok());
    }

    #[test]
    fn discover_walks_up() {
        let temp = TempDir::new().unwrap();
        Repo::init(temp.path(), false).unwrap();
        let nested = temp.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let repo = Repo::discover(&nested).unwrap();
        assert_eq!(repo.root(), temp.path());
    }

    #[test]
    fn odb_uses_repo_layout() {
        let temp = TempDir::new().unwrap();
        let repo = Repo::init(temp.path(), false).unwrap();
        let odb = repo.odb(Some(vec![LinkType::Hardlink]));
        assert_eq!(odb.path(), repo.object_dir());
        assert_eq!(odb.cache_types(), &[LinkType::Hardlink]);
    }
}
