//! Error types for the script host.
//!
//! This module defines the error taxonomy using `thiserror`:
//! - [`ScriptHostError`]: every failure the host can produce
//! - [`ErrorKind`]: the caller-visible classification of an error
//! - [`ErrorInfo`]: the serializable error payload delivered with a
//!   failed execution outcome

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level script host errors.
///
/// The taxonomy distinguishes three scopes:
/// - process readiness (`Init`, `NotReady`): the host refuses work but
///   stays alive and can retry initialization
/// - per-request (`MemoryAccess`, `Encoding`, `Allocation`, non-fatal
///   `Trap`, `ScriptError`): one request fails, the instance is kept
/// - per-request plus engine (fatal `Trap`, `Timeout`): the request
///   fails and the instance is torn down and reinitialized before the
///   next one is served
///
/// No variant terminates the host process.
#[derive(Error, Debug)]
pub enum ScriptHostError {
    /// Engine initialization failed (missing/corrupt asset, compile
    /// failure, or a missing import at link time).
    #[error("Initialization failed: {reason}")]
    Init {
        /// Description of the initialization failure.
        reason: String,
    },

    /// A request was submitted while no live instance exists.
    #[error("Engine not ready: {reason}")]
    NotReady {
        /// Why the engine is not ready (usually the last init failure).
        reason: String,
    },

    /// A guest-supplied pointer/length pair fell outside linear memory.
    #[error("Memory access out of bounds: [{offset}, {offset}+{len}) exceeds {memory_size} bytes")]
    MemoryAccess {
        /// Start offset of the rejected access.
        offset: u64,
        /// Length of the rejected access.
        len: u64,
        /// Linear memory size at the time of the check.
        memory_size: u64,
    },

    /// Bytes copied out of guest memory were not valid UTF-8.
    #[error("Invalid string encoding: {reason}")]
    Encoding {
        /// Description of the encoding failure.
        reason: String,
    },

    /// Guest memory allocation failed.
    #[error("Guest allocation failed: {reason}")]
    Allocation {
        /// Description of the allocation failure.
        reason: String,
    },

    /// The sandbox VM raised a trap during execution.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Human-readable trap description.
        message: String,
        /// Trap code if one could be extracted.
        code: Option<String>,
        /// Whether VM-state corruption is suspected. Fatal traps force
        /// teardown and reinitialization before the next request.
        fatal: bool,
    },

    /// Execution exceeded the configured wall-clock limit.
    ///
    /// The instance is torn down and reinitialized unconditionally,
    /// guaranteeing forward progress for later requests.
    #[error("Execution timeout after {limit_ms}ms")]
    Timeout {
        /// The configured limit in milliseconds.
        limit_ms: u64,
    },

    /// The script itself raised an uncaught guest-level exception.
    ///
    /// This is a normal return from the evaluation export, never a VM
    /// trap; the instance remains usable.
    #[error("Script error: {message}")]
    Script {
        /// The exception text reported by the guest engine.
        message: String,
    },

    /// The request/result channel was closed unexpectedly.
    #[error("Channel error: {reason}")]
    Channel {
        /// Description of the channel failure.
        reason: String,
    },

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// I/O operation failed (asset extraction, cache access).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ScriptHostError {
    /// Create a new `Init` error.
    pub fn init(reason: impl Into<String>) -> Self {
        Self::Init {
            reason: reason.into(),
        }
    }

    /// Create a new `NotReady` error.
    pub fn not_ready(reason: impl Into<String>) -> Self {
        Self::NotReady {
            reason: reason.into(),
        }
    }

    /// Create a new `Encoding` error.
    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding {
            reason: reason.into(),
        }
    }

    /// Create a new `Allocation` error.
    pub fn allocation(reason: impl Into<String>) -> Self {
        Self::Allocation {
            reason: reason.into(),
        }
    }

    /// Create a new `Script` error.
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create a new `Channel` error.
    pub fn channel(reason: impl Into<String>) -> Self {
        Self::Channel {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if the engine must be torn down and
    /// reinitialized before serving the next request.
    pub fn requires_restart(&self) -> bool {
        matches!(
            self,
            Self::Trap { fatal: true, .. } | Self::Timeout { .. }
        )
    }

    /// Returns `true` if this error indicates the host refused the
    /// request because no live instance exists.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::Init { .. } | Self::NotReady { .. })
    }

    /// The caller-visible classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Init { .. } => ErrorKind::Init,
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::MemoryAccess { .. } => ErrorKind::MemoryAccess,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::Trap { fatal: false, .. } => ErrorKind::Trap,
            Self::Trap { fatal: true, .. } => ErrorKind::EngineRestartRequired,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Script { .. } => ErrorKind::Script,
            Self::Channel { .. } => ErrorKind::Channel,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Caller-visible error classification.
///
/// Delivered with every failed outcome so callers can distinguish
/// per-request failures from engine-level ones without parsing
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Engine initialization failed.
    Init,
    /// No live instance exists.
    NotReady,
    /// Out-of-bounds guest memory access rejected by the host.
    MemoryAccess,
    /// Invalid UTF-8 crossed the memory boundary.
    Encoding,
    /// Guest memory allocation failed.
    Allocation,
    /// Non-fatal VM trap; the instance was kept.
    Trap,
    /// Fatal VM trap; the engine was restarted.
    EngineRestartRequired,
    /// Wall-clock limit exceeded; the engine was restarted.
    Timeout,
    /// Uncaught guest-level script exception.
    Script,
    /// Request/result channel failure.
    Channel,
    /// Invalid configuration.
    InvalidConfig,
    /// Host-side I/O failure.
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::NotReady => "not_ready",
            Self::MemoryAccess => "memory_access",
            Self::Encoding => "encoding",
            Self::Allocation => "allocation",
            Self::Trap => "trap",
            Self::EngineRestartRequired => "engine_restart_required",
            Self::Timeout => "timeout",
            Self::Script => "script",
            Self::Channel => "channel",
            Self::InvalidConfig => "invalid_config",
            Self::Io => "io",
        };
        f.write_str(s)
    }
}

/// Serializable error payload delivered to the caller.
///
/// Every error delivered through the result channel carries the
/// request id, the error kind, and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// The request this error belongs to.
    pub request_id: String,
    /// Machine-readable classification.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
}

impl ErrorInfo {
    /// Build the caller-facing payload from a host error.
    pub fn from_error(request_id: impl Into<String>, error: &ScriptHostError) -> Self {
        Self {
            request_id: request_id.into(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
