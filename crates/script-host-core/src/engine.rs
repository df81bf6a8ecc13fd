//! Wasmtime engine configuration and creation.
//!
//! The [`WasmEngine`] is the foundation of the host. It is:
//! - Created once per process and destroyed at process stop
//! - Thread-safe; cheap to clone (the inner engine is shared)
//! - Configured with epoch interruption so the execution timeout can
//!   interrupt guest code that does not return on its own

use std::sync::Arc;

use tracing::info;
use wasmtime::{Config, Engine};

use script_host_common::{EngineConfig, ScriptHostError};

/// Process-wide WebAssembly engine wrapper.
///
/// This struct wraps a Wasmtime [`Engine`] configured for hosting one
/// long-lived guest instance. The engine owns all compiled modules and
/// instantiations created from it; at most one lives per process.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    config: EngineConfig,
}

impl WasmEngine {
    /// Create a new WebAssembly engine with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the Wasmtime configuration is invalid.
    pub fn new(config: &EngineConfig) -> Result<Self, ScriptHostError> {
        let mut wasmtime_config = Config::new();

        // Async support so guest calls can be awaited and interrupted
        wasmtime_config.async_support(true);

        // Epoch-based interruption backs the execution timeout
        if config.epoch_interruption {
            wasmtime_config.epoch_interruption(true);
        }

        wasmtime_config.cranelift_opt_level(wasmtime::OptLevel::Speed);

        let engine = Engine::new(&wasmtime_config).map_err(|e| {
            ScriptHostError::invalid_config(format!("Failed to create Wasmtime engine: {e}"))
        })?;

        info!(
            epoch_interruption = config.epoch_interruption,
            "Wasmtime engine initialized"
        );

        Ok(Self {
            engine: Arc::new(engine),
            config: config.clone(),
        })
    }

    /// Get a reference to the inner Wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Get the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Increment the epoch counter.
    ///
    /// Called periodically (every 1ms) by the service's ticker task so
    /// epoch deadlines translate to wall-clock milliseconds.
    pub fn increment_epoch(&self) {
        self.engine.increment_epoch();
    }

    /// Check if epoch interruption is enabled.
    pub fn epoch_interruption(&self) -> bool {
        self.config.epoch_interruption
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("epoch_interruption", &self.config.epoch_interruption)
            .field("module_asset", &self.config.module_asset)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_creation_default() {
        let config = EngineConfig::default();
        let engine = WasmEngine::new(&config);

        assert!(engine.is_ok());
        assert!(engine.unwrap().epoch_interruption());
    }

    #[test]
    fn test_engine_creation_no_epochs() {
        let config = EngineConfig {
            epoch_interruption: false,
            ..Default::default()
        };
        let engine = WasmEngine::new(&config).unwrap();
        assert!(!engine.epoch_interruption());
    }

    #[test]
    fn test_engine_epoch_increment() {
        let config = EngineConfig::default();
        let engine = WasmEngine::new(&config).unwrap();

        // Should not panic
        engine.increment_epoch();
        engine.increment_epoch();
    }

    #[test]
    fn test_engine_clone_shares_inner() {
        let config = EngineConfig::default();
        let engine = WasmEngine::new(&config).unwrap();
        let clone = engine.clone();

        assert!(Engine::same(engine.inner(), clone.inner()));
    }
}
