//! Configuration file structures for the script host.
//!
//! This module defines structures for TOML configuration files:
//! - [`ConfigFile`]: top-level configuration file structure
//! - [`ServiceConfig`]: host service settings

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;

/// Top-level configuration file structure.
///
/// # Example
///
/// ```toml
/// [runtime.engine]
/// assets_dir = "./assets"
/// cache_dir = "/var/cache/script-host"
/// module_asset = "quickjs.wasm"
///
/// [runtime.execution]
/// timeout_ms = 5000
///
/// [service]
/// init_on_start = true
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration (engine + execution settings).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Host service configuration.
    #[serde(default)]
    pub service: ServiceConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigFileError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }
}

/// Host service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    /// Initialize the engine eagerly when the service starts.
    ///
    /// When disabled, initialization is deferred until the first
    /// submitted request reaches the worker.
    #[serde(default = "defaults::init_on_start")]
    pub init_on_start: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            init_on_start: defaults::init_on_start(),
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

/// Default value functions for serde.
mod defaults {
    pub const fn init_on_start() -> bool {
        true
    }
}
