//! Configuration structures for the script host.
//!
//! This module defines configuration options for the runtime:
//! - [`RuntimeConfig`]: top-level configuration containing all settings
//! - [`EngineConfig`]: engine and module-asset settings
//! - [`ExecutionConfig`]: per-request limits (timeout, script size)

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// It can be loaded from a TOML file (see `config_file`) or built in
/// code with defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Engine and module-asset configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-request execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Engine and module-asset configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable epoch-based interruption.
    ///
    /// Required for the execution timeout to interrupt guest code that
    /// does not return on its own. Disable only in tests that never
    /// time out.
    #[serde(default = "defaults::epoch_interruption")]
    pub epoch_interruption: bool,

    /// Directory where extracted module bytes are cached.
    #[serde(default = "defaults::cache_dir")]
    pub cache_dir: String,

    /// Directory holding the packaged module assets.
    #[serde(default = "defaults::assets_dir")]
    pub assets_dir: String,

    /// Name of the guest engine asset to load.
    #[serde(default = "defaults::module_asset")]
    pub module_asset: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            epoch_interruption: defaults::epoch_interruption(),
            cache_dir: defaults::cache_dir(),
            assets_dir: defaults::assets_dir(),
            module_asset: defaults::module_asset(),
        }
    }
}

/// Per-request execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Wall-clock limit per evaluation in milliseconds.
    ///
    /// On expiry the engine attempts a cooperative interrupt; if the
    /// guest does not yield, the instance is torn down and
    /// reinitialized.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,

    /// Extra grace period in milliseconds before the host gives up on
    /// the cooperative interrupt and forces teardown.
    #[serde(default = "defaults::timeout_grace_ms")]
    pub timeout_grace_ms: u64,

    /// Maximum accepted script source size in bytes.
    #[serde(default = "defaults::max_script_bytes")]
    pub max_script_bytes: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: defaults::timeout_ms(),
            timeout_grace_ms: defaults::timeout_grace_ms(),
            max_script_bytes: defaults::max_script_bytes(),
        }
    }
}

impl ExecutionConfig {
    /// Get the timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the hard deadline (timeout plus grace) as a `Duration`.
    pub fn hard_deadline(&self) -> Duration {
        Duration::from_millis(self.timeout_ms + self.timeout_grace_ms)
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn epoch_interruption() -> bool {
        true
    }

    pub fn cache_dir() -> String {
        "./cache".to_string()
    }

    pub fn assets_dir() -> String {
        "./assets".to_string()
    }

    pub fn module_asset() -> String {
        "quickjs.wasm".to_string()
    }

    pub const fn timeout_ms() -> u64 {
        5_000
    }

    pub const fn timeout_grace_ms() -> u64 {
        1_000
    }

    pub const fn max_script_bytes() -> usize {
        1024 * 1024
    }
}
