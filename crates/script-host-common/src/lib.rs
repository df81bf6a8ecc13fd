//! Common types, errors, and utilities for script-host.
//!
//! This crate provides shared functionality used across the script-host
//! workspace:
//! - Error taxonomy using `thiserror` for type-safe error handling
//! - Configuration structures for runtime settings
//! - Request/outcome types with correlation ids

pub mod config;
pub mod config_file;
pub mod error;
pub mod types;

pub use config::{EngineConfig, ExecutionConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, ServiceConfig};
pub use error::{ErrorInfo, ErrorKind, ScriptHostError};
pub use types::{ExecutionOutcome, ExecutionRequest, RequestId, RequestStatus};
