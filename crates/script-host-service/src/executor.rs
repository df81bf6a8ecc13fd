//! The execution serializer.
//!
//! The engine/store/instance triple is not reentrant-safe, so exactly
//! one worker task owns it. All submissions, regardless of origin, are
//! merged into a single FIFO queue with no priority distinctions;
//! `submit` never blocks the caller. Per-request lifecycle:
//!
//! ```text
//! Queued → Running → Completed(value) | Failed(error)
//! ```
//!
//! Failures that suggest VM-state corruption (fatal traps) and
//! timeouts force a teardown and reinitialization before the next
//! request is served; everything else fails only the one request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use script_host_common::{
    ErrorInfo, ExecutionConfig, ExecutionOutcome, ExecutionRequest, RequestId, RequestStatus,
    ScriptHostError,
};
use script_host_core::EngineHost;

use crate::sink::CompletionSink;

/// How often the epoch ticker advances the engine epoch. Epoch
/// deadlines are set in these units, so one tick is one millisecond of
/// wall-clock budget.
const EPOCH_TICK: Duration = Duration::from_millis(1);

/// Handle to the single-worker execution queue.
pub struct ScriptExecutor {
    tx: mpsc::UnboundedSender<ExecutionRequest>,
    worker: JoinHandle<()>,
    ticker: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl ScriptExecutor {
    /// Spawn the worker that owns `host` and drains the queue.
    ///
    /// When `init_on_start` is set the worker initializes the engine
    /// eagerly; an init failure is logged and retried when the first
    /// request arrives, never escalated.
    pub fn spawn(
        host: EngineHost,
        config: ExecutionConfig,
        sink: Arc<dyn CompletionSink>,
        init_on_start: bool,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(false));

        let ticker = host.engine().epoch_interruption().then(|| {
            let engine = host.engine().clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(EPOCH_TICK);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    interval.tick().await;
                    engine.increment_epoch();
                }
            })
        });

        let worker = tokio::spawn(run_worker(
            host,
            config,
            sink,
            rx,
            Arc::clone(&running),
            init_on_start,
        ));

        Self {
            tx,
            worker,
            ticker,
            running,
        }
    }

    /// Enqueue a script with a generated correlation id.
    ///
    /// Never blocks; the outcome arrives through the completion sink.
    ///
    /// # Errors
    ///
    /// Fails with `Channel` when the worker has shut down.
    pub fn submit(&self, source: impl Into<String>) -> Result<RequestId, ScriptHostError> {
        self.submit_request(ExecutionRequest::new(source))
    }

    /// Enqueue a script under a caller-supplied correlation id.
    ///
    /// # Errors
    ///
    /// Fails with `Channel` when the worker has shut down.
    pub fn submit_with_id(
        &self,
        id: RequestId,
        source: impl Into<String>,
    ) -> Result<RequestId, ScriptHostError> {
        self.submit_request(ExecutionRequest::with_id(id, source))
    }

    fn submit_request(&self, request: ExecutionRequest) -> Result<RequestId, ScriptHostError> {
        let id = request.id.clone();
        debug!(request_id = %id, "Request queued");
        self.tx
            .send(request)
            .map_err(|_| ScriptHostError::channel("Executor worker has shut down"))?;
        Ok(id)
    }

    /// Whether a request is in the Running state right now.
    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Close the queue, let the worker drain it, and tear the engine
    /// down.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(error = %e, "Executor worker panicked during shutdown");
        }
        if let Some(ticker) = self.ticker {
            ticker.abort();
        }
    }
}

impl std::fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

async fn run_worker(
    mut host: EngineHost,
    config: ExecutionConfig,
    sink: Arc<dyn CompletionSink>,
    mut rx: mpsc::UnboundedReceiver<ExecutionRequest>,
    running: Arc<AtomicBool>,
    init_on_start: bool,
) {
    if init_on_start {
        if let Err(e) = host.init().await {
            // The host stays alive; init is retried per request
            warn!(error = %e, "Eager initialization failed; will retry on first request");
        }
    }

    while let Some(request) = rx.recv().await {
        let was_running = running.swap(true, Ordering::SeqCst);
        debug_assert!(!was_running, "two requests in Running state at once");

        let outcome = serve(&mut host, &config, request).await;

        running.store(false, Ordering::SeqCst);
        sink.deliver(outcome);
    }

    info!("Request queue closed; tearing down engine");
    host.teardown();
}

/// Drive one request from Running to its terminal state.
async fn serve(
    host: &mut EngineHost,
    config: &ExecutionConfig,
    request: ExecutionRequest,
) -> ExecutionOutcome {
    let queue_wait = request.submitted_at.elapsed();
    let started = Instant::now();
    debug!(request_id = %request.id, queue_wait_ms = queue_wait.as_millis() as u64, "Request running");

    let result = evaluate(host, config, &request).await;

    if let Err(e) = &result {
        if e.requires_restart() {
            if let Err(reinit_err) = host.reinit().await {
                // Stay alive and not-ready; the next request retries
                error!(error = %reinit_err, "Reinitialization failed; host is not ready");
            }
        }
    }

    let status = match result {
        Ok(value) => RequestStatus::Completed { value },
        Err(e) => RequestStatus::Failed {
            error: ErrorInfo::from_error(request.id.as_str(), &e),
        },
    };

    ExecutionOutcome {
        id: request.id,
        status,
        duration: started.elapsed(),
        queue_wait,
    }
}

async fn evaluate(
    host: &mut EngineHost,
    config: &ExecutionConfig,
    request: &ExecutionRequest,
) -> Result<String, ScriptHostError> {
    if request.source.len() > config.max_script_bytes {
        return Err(ScriptHostError::allocation(format!(
            "Script of {} bytes exceeds the {}-byte limit",
            request.source.len(),
            config.max_script_bytes
        )));
    }

    // Lazy init: a host that failed to start earlier gets one fresh
    // attempt per request.
    if !host.is_ready() {
        if let Err(e) = host.init().await {
            return Err(ScriptHostError::not_ready(e.to_string()));
        }
    }

    let eval = host.eval(request.id.as_str(), &request.source, config.timeout_ms);

    // The epoch deadline is the cooperative interrupt; this wall-clock
    // backstop catches a sandbox that never yields. Expiry abandons the
    // in-flight call, so the instance must be considered corrupt.
    match tokio::time::timeout(config.hard_deadline(), eval).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                request_id = %request.id,
                limit_ms = config.timeout_ms,
                "Guest did not yield to the cooperative interrupt; forcing teardown"
            );
            host.teardown();
            Err(ScriptHostError::Timeout {
                limit_ms: config.timeout_ms,
            })
        }
    }
}
