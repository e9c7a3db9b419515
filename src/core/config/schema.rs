//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Global Config
//!
//! Located at (in order of precedence):
//! 1. `$DVC_DATA_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/dvc-data/config.toml`
//! 3. `~/.dvc-data/config.toml` (canonical write location)
//!
//! # Repo Config
//!
//! Located at `<control_dir>/config.toml`.
//!
//! # Validation
//!
//! Config values are validated after parsing: hash names must be supported
//! algorithms and cache types must be known link types.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::hashfile::hash;
use crate::hashfile::link::LinkType;

/// Global configuration (user scope).
///
/// # Example
///
/// ```toml
/// interactive = true
///
/// [core]
/// hash = "md5"
///
/// [cache]
/// type = ["hardlink", "copy"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    /// Ask before removing uncached workspace files
    pub interactive: Option<bool>,

    /// Hashing defaults
    pub core: Option<CoreConfig>,

    /// Object cache defaults
    pub cache: Option<CacheConfig>,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(core) = &self.core {
            core.validate()?;
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        Ok(())
    }
}

/// Repository configuration.
///
/// # Example
///
/// ```toml
/// [core]
/// hash = "md5-dos2unix"
///
/// [cache]
/// type = ["reflink", "copy"]
/// shared = true
/// verify = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RepoConfig {
    /// Hashing settings
    pub core: Option<CoreConfig>,

    /// Object cache settings
    pub cache: Option<CacheConfig>,
}

impl RepoConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(core) = &self.core {
            core.validate()?;
        }
        if let Some(cache) = &self.cache {
            cache.validate()?;
        }
        Ok(())
    }
}

/// `[core]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Hash algorithm for new objects
    pub hash: Option<String>,
}

impl CoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.hash {
            if !hash::is_supported(name) {
                return Err(ConfigError::InvalidValue(format!(
                    "invalid hash '{}', must be one of: {}",
                    name,
                    hash::ALGORITHMS.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Link types tried in order during checkout
    #[serde(rename = "type")]
    pub types: Option<Vec<String>>,

    /// Group-shared cache permissions
    pub shared: Option<bool>,

    /// Re-hash objects when adding them
    pub verify: Option<bool>,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(types) = &self.types {
            if types.is_empty() {
                return Err(ConfigError::InvalidValue(
                    "cache.type cannot be empty".to_string(),
                ));
            }
            for typ in types {
                typ.parse::<LinkType>()
                    .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
            }
        }
        Ok(())
    }
}
