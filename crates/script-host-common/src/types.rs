//! Request and outcome types for the script host.
//!
//! Submission is fire-and-forget: callers receive a [`RequestId`] at
//! submit time and the matching [`ExecutionOutcome`] later through the
//! completion side channel. The id is the only thing pairing the two.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorInfo;

/// Correlation id pairing a request with its eventual outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a caller-supplied id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An accepted script-execution request.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Correlation id (caller-supplied or generated at submit time).
    pub id: RequestId,

    /// Script source text to evaluate.
    pub source: String,

    /// When the request entered the queue.
    pub submitted_at: Instant,
}

impl ExecutionRequest {
    /// Create a request with a generated id.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: RequestId::generate(),
            source: source.into(),
            submitted_at: Instant::now(),
        }
    }

    /// Create a request with a caller-supplied id.
    pub fn with_id(id: RequestId, source: impl Into<String>) -> Self {
        Self {
            id,
            source: source.into(),
            submitted_at: Instant::now(),
        }
    }
}

/// Terminal status of a request.
///
/// Every accepted request resolves to exactly one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    /// Evaluation returned a value.
    Completed {
        /// The value produced by the guest engine, as text.
        value: String,
    },

    /// Evaluation failed; the payload describes how.
    Failed {
        /// Caller-facing error detail.
        error: ErrorInfo,
    },
}

impl RequestStatus {
    /// Returns `true` for a completed request.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// The produced value, if any.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Completed { value } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    /// The error detail, if any.
    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Completed { .. } => None,
            Self::Failed { error } => Some(error),
        }
    }
}

/// The resolved outcome of one request, delivered asynchronously.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// Correlation id of the originating request.
    pub id: RequestId,

    /// Terminal status.
    pub status: RequestStatus,

    /// Time from dequeue to resolution.
    pub duration: Duration,

    /// Time the request spent queued before running.
    pub queue_wait: Duration,
}

impl ExecutionOutcome {
    /// Returns `true` for a completed request.
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }
}
