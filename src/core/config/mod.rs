//! core::config
//!
//! Configuration schema and loading.
//!
//! # Overview
//!
//! There are two configuration scopes:
//! - **Global**: User-level settings
//! - **Repo**: Repository-level overrides
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$DVC_DATA_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/dvc-data/config.toml`
//! 3. `~/.dvc-data/config.toml` (canonical write location)
//!
//! # Repo Config Location
//!
//! `<control_dir>/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use dvc_data::core::config::Config;
//! use dvc_data::core::paths::DataPaths;
//! use std::path::Path;
//!
//! let paths = DataPaths::for_root(Path::new("/path/to/repo"));
//! let config = Config::load(Some(&paths)).unwrap();
//!
//! println!("hash: {}", config.hash_name());
//! println!("cache types: {:?}", config.cache_types());
//! ```

pub mod schema;

pub use schema::{CacheConfig, CoreConfig, GlobalConfig, RepoConfig};

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::fsutil;
use crate::core::paths::DataPaths;
use crate::hashfile::hash::DEFAULT_ALGORITHM;
use crate::hashfile::link::{LinkType, DEFAULT_CACHE_TYPES};

/// Environment variable naming an explicit global config file.
pub const CONFIG_ENV: &str = "DVC_DATA_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence rules; repo config overrides global config.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: GlobalConfig,
    pub repo: Option<RepoConfig>,
    global_path: Option<PathBuf>,
    repo_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `paths` is provided, also loads the repo config.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed or hold
    /// invalid values. Missing config files are not an error.
    pub fn load(paths: Option<&DataPaths>) -> Result<Self, ConfigError> {
        let (global, global_path) = Self::load_global()?;

        let (repo, repo_path) = match paths {
            Some(paths) => {
                let path = paths.config_path();
                if path.exists() {
                    (Some(Self::read_config::<RepoConfig>(&path)?), Some(path))
                } else {
                    (None, None)
                }
            }
            None => (None, None),
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        Ok(Config {
            global,
            repo,
            global_path,
            repo_path,
        })
    }

    fn load_global() -> Result<(GlobalConfig, Option<PathBuf>), ConfigError> {
        // 1. $DVC_DATA_CONFIG
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                let config = Self::read_config(&path)?;
                return Ok((config, Some(path)));
            }
        }

        // 2. $XDG_CONFIG_HOME/dvc-data/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("dvc-data/config.toml");
            if path.exists() {
                let config = Self::read_config(&path)?;
                return Ok((config, Some(path)));
            }
        }

        // 3. ~/.dvc-data/config.toml
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".dvc-data/config.toml");
            if path.exists() {
                let config = Self::read_config(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((GlobalConfig::default(), None))
    }

    fn read_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write repo config atomically.
    pub fn write_repo(paths: &DataPaths, config: &RepoConfig) -> Result<PathBuf, ConfigError> {
        let path = paths.config_path();
        Self::write_config_atomic(&path, config)?;
        Ok(path)
    }

    fn write_config_atomic<T: serde::Serialize>(
        path: &Path,
        config: &T,
    ) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        fsutil::write_atomic(path, contents.as_bytes()).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn core_value<T>(&self, f: impl Fn(&CoreConfig) -> Option<T>) -> Option<T> {
        self.repo
            .as_ref()
            .and_then(|r| r.core.as_ref())
            .and_then(&f)
            .or_else(|| self.global.core.as_ref().and_then(&f))
    }

    fn cache_value<T>(&self, f: impl Fn(&CacheConfig) -> Option<T>) -> Option<T> {
        self.repo
            .as_ref()
            .and_then(|r| r.cache.as_ref())
            .and_then(&f)
            .or_else(|| self.global.cache.as_ref().and_then(&f))
    }

    /// Hash algorithm for new objects. Defaults to `md5`.
    pub fn hash_name(&self) -> String {
        self.core_value(|c| c.hash.clone())
            .unwrap_or_else(|| DEFAULT_ALGORITHM.to_string())
    }

    /// Link types for checkout, in preference order.
    ///
    /// Defaults to `reflink, copy`. Values were validated on load.
    pub fn cache_types(&self) -> Vec<LinkType> {
        self.cache_value(|c| c.types.clone())
            .map(|types| types.iter().filter_map(|t| t.parse().ok()).collect())
            .unwrap_or_else(|| DEFAULT_CACHE_TYPES.to_vec())
    }

    /// Whether the cache is group-shared. Defaults to `false`.
    pub fn shared(&self) -> bool {
        self.cache_value(|c| c.shared).unwrap_or(false)
    }

    /// Whether objects are re-hashed when added. Defaults to `false`.
    pub fn verify(&self) -> bool {
        self.cache_value(|c| c.verify).unwrap_or(false)
    }

    /// Whether destructive checkouts prompt. Defaults to `true`.
    pub fn interactive(&self) -> bool {
        self.global.interactive.unwrap_or(true)
    }

    pub fn global_config_loaded_from(&self) -> Option<&Path> {
        self.global_path.as_deref()
    }

    pub fn repo_config_loaded_from(&self) -> Option<&Path> {
        self.repo_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_paths(temp: &TempDir) -> DataPaths {
        let paths = DataPaths::new(temp.path().to_path_buf(), temp.path().join(".dvc"));
        fs::create_dir_all(&paths.control_dir).unwrap();
        paths
    }

    #[test]
    fn defaults_when_nothing_configured() {
        let config = Config::default();
        assert_eq!(config.hash_name(), "md5");
        assert_eq!(config.cache_types(), vec![LinkType::Reflink, LinkType::Copy]);
        assert!(!config.shared());
        assert!(!config.verify());
        assert!(config.interactive());
    }

    #[test]
    fn load_repo_config() {
        let temp = TempDir::new().unwrap();
        let paths = repo_paths(&temp);

        fs::write(
            paths.config_path(),
            r#"
            [core]
            hash = "sha256"

            [cache]
            type = ["hardlink", "copy"]
            shared = true
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&paths)).unwrap();

        assert_eq!(config.hash_name(), "sha256");
        assert_eq!(config.cache_types(), vec![LinkType::Hardlink, LinkType::Copy]);
        assert!(config.shared());
        assert_eq!(config.repo_config_loaded_from(), Some(paths.config_path().as_path()));
    }

    #[test]
    fn write_repo_config_atomic() {
        let temp = TempDir::new().unwrap();
        let paths = repo_paths(&temp);

        let config = RepoConfig {
            core: Some(CoreConfig {
                hash: Some("md5-dos2unix".to_string()),
            }),
            ..Default::default()
        };

        let path = Config::write_repo(&paths, &config).unwrap();
        assert!(path.exists());

        let loaded = Config::load(Some(&paths)).unwrap();
        assert_eq!(loaded.hash_name(), "md5-dos2unix");
    }

    #[test]
    fn invalid_hash_rejected() {
        let temp = TempDir::new().unwrap();
        let paths = repo_paths(&temp);
        fs::write(paths.config_path(), "[core]\nhash = \"crc32\"\n").unwrap();

        let result = Config::load(Some(&paths));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let paths = repo_paths(&temp);
        fs::write(paths.config_path(), "remote = \"origin\"\n").unwrap();

        let result = Config::load(Some(&paths));
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn precedence_repo_overrides_global() {
        let config = Config {
            global: GlobalConfig {
                core: Some(CoreConfig {
                    hash: Some("sha512".to_string()),
                }),
                cache: Some(CacheConfig {
                    verify: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            repo: Some(RepoConfig {
                core: Some(CoreConfig {
                    hash: Some("md5".to_string()),
                }),
                ..Default::default()
            }),
            global_path: None,
            repo_path: None,
        };

        assert_eq!(config.hash_name(), "md5");
        // Falls through to global when the repo leaves it unset
        assert!(config.verify());
    }
}
