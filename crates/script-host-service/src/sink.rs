//! Asynchronous result delivery.
//!
//! Submission is fire-and-forget; outcomes travel through a
//! [`CompletionSink`] rather than a synchronous return, because the
//! caller may already be gone by the time evaluation finishes. The
//! correlation id inside each [`ExecutionOutcome`] is what pairs a
//! delivery with its request.

use tokio::sync::mpsc;
use tracing::{error, info};

use script_host_common::{ExecutionOutcome, RequestStatus};

/// Receives the resolved outcome of every accepted request.
///
/// Implementations must not block: delivery happens on the executor's
/// worker task.
pub trait CompletionSink: Send + Sync {
    /// Deliver one resolved outcome.
    fn deliver(&self, outcome: ExecutionOutcome);
}

/// Sink that logs each outcome through `tracing`.
///
/// This is the default delivery channel of the standalone host
/// process: results land in process-wide diagnostics, correlated by
/// request id.
#[derive(Debug, Default)]
pub struct TracingSink;

impl CompletionSink for TracingSink {
    fn deliver(&self, outcome: ExecutionOutcome) {
        match &outcome.status {
            RequestStatus::Completed { value } => {
                info!(
                    request_id = %outcome.id,
                    duration_ms = outcome.duration.as_millis() as u64,
                    queue_wait_ms = outcome.queue_wait.as_millis() as u64,
                    value = %value,
                    "Script completed"
                );
            }
            RequestStatus::Failed { error } => {
                error!(
                    request_id = %outcome.id,
                    duration_ms = outcome.duration.as_millis() as u64,
                    kind = %error.kind,
                    "Script failed: {}",
                    error.message
                );
            }
        }
    }
}

/// Sink that forwards outcomes into an unbounded channel.
///
/// Used by embedders and tests that want to consume outcomes
/// programmatically.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ExecutionOutcome>,
}

impl ChannelSink {
    /// Create a sink and the receiver draining it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl CompletionSink for ChannelSink {
    fn deliver(&self, outcome: ExecutionOutcome) {
        // A dropped receiver means nobody is listening anymore; the
        // outcome is discarded, matching fire-and-forget semantics.
        let _ = self.tx.send(outcome);
    }
}
