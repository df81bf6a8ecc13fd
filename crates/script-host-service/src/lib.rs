//! Execution serializer and persistent host service for script-host.
//!
//! This crate composes the core runtime into the long-lived background
//! process the host runs as:
//! - [`ScriptExecutor`]: the single-worker FIFO queue that serializes
//!   all access to the non-reentrant execution state
//! - [`CompletionSink`]: the asynchronous side channel delivering
//!   outcomes, correlated by request id
//! - [`ScriptHostService`]: start/stop lifecycle around the executor
//!
//! # Control flow
//!
//! ```text
//! caller → submit() → FIFO queue → worker → guest js_eval → sink
//! ```

pub mod executor;
pub mod service;
pub mod sink;

pub use executor::ScriptExecutor;
pub use service::ScriptHostService;
pub use sink::{ChannelSink, CompletionSink, TracingSink};
