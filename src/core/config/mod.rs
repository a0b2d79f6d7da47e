//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (not handled here)
//!
//! # Config Locations
//!
//! Searched in order:
//! 1. `$DOCFILE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/docfile/config.toml`
//! 3. `~/.docfile/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use docfile::core::config::Config;
//!
//! let config = Config::load().unwrap();
//! println!("Default format: {}", config.default_format());
//! println!("Threshold: {}", config.max_uncommitted_changes());
//! ```

pub mod schema;

pub use schema::StoreConfig;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::format::Format;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "DOCFILE_CONFIG";

/// Change Throttle threshold when none is configured.
pub const DEFAULT_MAX_UNCOMMITTED_CHANGES: u64 = 100;

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

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration with defaults applied by the accessors.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Raw file contents.
    pub store: StoreConfig,
    /// Path to the config file (if loaded)
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Wrap an in-memory config.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is invalid.
    pub fn new(store: StoreConfig) -> Result<Self, ConfigError> {
        store.validate()?;
        Ok(Self {
            store,
            loaded_from: None,
        })
    }

    /// Defaults with an explicit base directory.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig {
                base_dir: Some(base_dir.into()),
                ..Default::default()
            },
            loaded_from: None,
        }
    }

    /// Load configuration from the standard locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    /// A missing config file is not an error (defaults are used).
    pub fn load() -> Result<Self, ConfigError> {
        match Self::locate() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let store: StoreConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        store.validate()?;

        Ok(Self {
            store,
            loaded_from: Some(path.to_path_buf()),
        })
    }

    /// Find the first existing config file.
    fn locate() -> Option<PathBuf> {
        // 1. Check $DOCFILE_CONFIG
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        // 2. Check $XDG_CONFIG_HOME/docfile/config.toml
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("docfile/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Check ~/.docfile/config.toml
        let path = dirs::home_dir()?.join(".docfile/config.toml");
        path.exists().then_some(path)
    }

    // =========================================================================
    // Accessor methods with defaults
    // =========================================================================

    /// Configured base directory, if any.
    ///
    /// `None` means the current directory.
    pub fn base_dir(&self) -> Option<&Path> {
        self.store.base_dir.as_deref()
    }

    /// Format used when the extension gives no hint.
    ///
    /// Defaults to pretty JSON.
    pub fn default_format(&self) -> Format {
        self.store.default_format.unwrap_or_default()
    }

    /// Change Throttle threshold.
    ///
    /// Defaults to 100.
    pub fn max_uncommitted_changes(&self) -> u64 {
        self.store
            .max_uncommitted_changes
            .unwrap_or(DEFAULT_MAX_UNCOMMITTED_CHANGES)
    }

    /// Whether scratch files are fsynced.
    ///
    /// Defaults to `true`.
    pub fn sync_writes(&self) -> bool {
        self.store.sync_writes.unwrap_or(true)
    }

    /// Get the path to the loaded config file.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}
