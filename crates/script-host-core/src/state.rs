//! Host-side state attached to the guest store.
//!
//! [`HostState`] is the data type of the single long-lived
//! `Store<HostState>`. Host bindings reach it through the
//! [`wasmtime::Caller`] API. It carries the id of the request currently
//! being served (the store outlives individual requests) and the guest
//! log messages captured during that request.

use std::time::Instant;

/// Per-store host state.
///
/// The store, and therefore this state, is owned exclusively by the
/// execution serializer's worker; no other component touches it.
#[derive(Debug, Default)]
pub struct HostState {
    /// Id of the request currently being evaluated, if any.
    current_request: Option<String>,

    /// Guest log messages captured during the current request.
    pub guest_logs: Vec<GuestLogEntry>,
}

/// A single message emitted by the guest through the logging binding.
#[derive(Debug, Clone)]
pub struct GuestLogEntry {
    /// Message content.
    pub message: String,

    /// When the message was recorded.
    pub timestamp: Instant,
}

impl HostState {
    /// Create empty host state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the start of a request; clears logs from the previous one.
    pub fn begin_request(&mut self, request_id: &str) {
        self.current_request = Some(request_id.to_string());
        self.guest_logs.clear();
    }

    /// Mark the end of the current request.
    pub fn end_request(&mut self) {
        self.current_request = None;
    }

    /// Id of the request currently being evaluated.
    pub fn current_request(&self) -> Option<&str> {
        self.current_request.as_deref()
    }

    /// Record a guest log message.
    pub fn record_guest_log(&mut self, message: String) {
        self.guest_logs.push(GuestLogEntry {
            message,
            timestamp: Instant::now(),
        });
    }
}
