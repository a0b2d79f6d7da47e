//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Values are validated after parsing: the default format must be concrete
//! and the change threshold must be at least one.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::format::Format;

/// Store configuration.
///
/// # Example
///
/// ```toml
/// base_dir = "/var/lib/myapp"
/// default_format = "toml"
/// max_uncommitted_changes = 250
/// sync_writes = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory that relative document paths resolve against.
    pub base_dir: Option<PathBuf>,

    /// Format used when a document's extension gives no hint.
    pub default_format: Option<Format>,

    /// Change Throttle threshold for newly opened references.
    pub max_uncommitted_changes: Option<u64>,

    /// fsync scratch files before renaming them into place.
    pub sync_writes: Option<bool>,
}

impl StoreConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(format) = self.default_format {
            if !format.is_concrete() {
                return Err(ConfigError::InvalidValue(format!(
                    "default_format must be one of json, compact-json, toml (got '{}')",
                    format
                )));
            }
        }

        if self.max_uncommitted_changes == Some(0) {
            return Err(ConfigError::InvalidValue(
                "max_uncommitted_changes must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
