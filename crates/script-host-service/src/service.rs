//! The persistent host service.
//!
//! [`ScriptHostService`] composes the execution serializer into a
//! long-lived process component. It reacts to the two lifecycle
//! signals (start and stop, both idempotent) and stays resident
//! between requests so the engine/module warm-up cost is paid once and
//! amortized across many submissions, not per request.

use std::sync::Arc;

use tracing::{debug, info};

use script_host_bindings::default_registry;
use script_host_common::{RequestId, RuntimeConfig, ScriptHostError, ServiceConfig};
use script_host_core::{AssetStore, EngineHost};

use crate::executor::ScriptExecutor;
use crate::sink::{CompletionSink, TracingSink};

/// Long-lived host service accepting script-execution requests.
pub struct ScriptHostService {
    runtime_config: RuntimeConfig,
    service_config: ServiceConfig,
    sink: Arc<dyn CompletionSink>,
    executor: Option<ScriptExecutor>,
}

impl ScriptHostService {
    /// Create a stopped service delivering outcomes to `sink`.
    pub fn new(
        runtime_config: RuntimeConfig,
        service_config: ServiceConfig,
        sink: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            runtime_config,
            service_config,
            sink,
            executor: None,
        }
    }

    /// Create a stopped service that logs outcomes through `tracing`.
    pub fn with_tracing_sink(runtime_config: RuntimeConfig, service_config: ServiceConfig) -> Self {
        Self::new(runtime_config, service_config, Arc::new(TracingSink))
    }

    /// Start signal: build the engine host, link the default bindings,
    /// and spawn the worker. A no-op when already started.
    ///
    /// # Errors
    ///
    /// Fails when the engine cannot be created or bindings cannot be
    /// linked. A failing guest-module load does NOT fail `start`; the
    /// worker reports it per request as `NotReady` and keeps retrying.
    pub fn start(&mut self) -> Result<(), ScriptHostError> {
        if self.executor.is_some() {
            debug!("start() called while running; no-op");
            return Ok(());
        }

        let engine_config = &self.runtime_config.engine;
        let assets = AssetStore::new(&engine_config.assets_dir, &engine_config.cache_dir);

        let mut host = EngineHost::new(engine_config, assets)?;
        default_registry()?.install(host.linker_mut())?;

        self.executor = Some(ScriptExecutor::spawn(
            host,
            self.runtime_config.execution.clone(),
            Arc::clone(&self.sink),
            self.service_config.init_on_start,
        ));

        info!("Script host service started");
        Ok(())
    }

    /// Stop signal: drain the queue, tear the engine down, release the
    /// worker. A no-op when already stopped.
    pub async fn stop(&mut self) {
        if let Some(executor) = self.executor.take() {
            executor.shutdown().await;
            info!("Script host service stopped");
        }
    }

    /// Whether the service has been started and not yet stopped.
    pub fn is_running(&self) -> bool {
        self.executor.is_some()
    }

    /// Enqueue a script with a generated correlation id.
    ///
    /// # Errors
    ///
    /// Fails with `NotReady` when the service is stopped.
    pub fn submit(&self, source: impl Into<String>) -> Result<RequestId, ScriptHostError> {
        self.executor()?.submit(source)
    }

    /// Enqueue a script under a caller-supplied correlation id.
    ///
    /// # Errors
    ///
    /// Fails with `NotReady` when the service is stopped.
    pub fn submit_with_id(
        &self,
        id: RequestId,
        source: impl Into<String>,
    ) -> Result<RequestId, ScriptHostError> {
        self.executor()?.submit_with_id(id, source)
    }

    fn executor(&self) -> Result<&ScriptExecutor, ScriptHostError> {
        self.executor
            .as_ref()
            .ok_or_else(|| ScriptHostError::not_ready("Service is stopped"))
    }
}

impl std::fmt::Debug for ScriptHostService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptHostService")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use script_host_common::EngineConfig;

    fn unready_config() -> RuntimeConfig {
        // Points at directories that don't exist; start() must still
        // succeed and submissions must resolve NotReady, not crash
        RuntimeConfig {
            engine: EngineConfig {
                assets_dir: "/nonexistent/assets".into(),
                cache_dir: "/nonexistent/cache".into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let mut service =
            ScriptHostService::with_tracing_sink(unready_config(), ServiceConfig::default());

        assert!(!service.is_running());
        service.start().unwrap();
        assert!(service.is_running());
        service.start().unwrap();
        assert!(service.is_running());

        service.stop().await;
        assert!(!service.is_running());
        service.stop().await;
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_submit_while_stopped() {
        let service =
            ScriptHostService::with_tracing_sink(unready_config(), ServiceConfig::default());

        let result = service.submit("1+1");
        assert!(matches!(result, Err(ScriptHostError::NotReady { .. })));
    }
}
