//! Configuration loading for sync-core.
//!
//! Configuration is loaded from a TOML file; every key is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// In-memory authority configuration.
    #[serde(default)]
    pub authority: AuthorityConfig,
}

/// In-memory authority configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Upper bound on the worker threads one push fans out across
    /// (default: available parallelism).
    #[serde(default = "default_max_fanout_workers")]
    pub max_fanout_workers: usize,
}

fn default_max_fanout_workers() -> usize {
    std::thread::available_parallelism().map_or_else(
        |e| {
            tracing::warn!("Failed to get available parallelism, fanning out on one worker: {}", e);
            1
        },
        |n| n.get(),
    )
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            max_fanout_workers: default_max_fanout_workers(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`Config::validate`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the authority cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.authority.max_fanout_workers == 0 {
            return Err(ConfigError::Invalid {
                reason: "authority.max_fanout_workers must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}
