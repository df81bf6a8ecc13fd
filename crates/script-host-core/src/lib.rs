//! Core sandbox runtime for script-host.
//!
//! This crate provides the engine side of the host:
//! - [`WasmEngine`]: configured Wasmtime engine, one per process
//! - [`CompiledModule`]: compiled guest engine module wrapper
//! - [`AssetStore`]: packaged-asset loading with a local cache
//! - [`memory`]: string marshalling across the linear-memory boundary
//! - [`EngineHost`]: lifecycle manager owning the single live instance
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     WasmEngine                          │
//! │  (process-wide, created once, destroyed at stop)        │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                   CompiledModule                        │
//! │  (compiled once from the cached asset, reused)          │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │        Store<HostState> + Instance + GuestAbi           │
//! │  (exactly one while ready; owned by the worker)         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod assets;
pub mod engine;
pub mod lifecycle;
pub mod memory;
pub mod module;
pub mod state;

pub use assets::AssetStore;
pub use engine::WasmEngine;
pub use lifecycle::EngineHost;
pub use memory::{EvalOutput, GuestAbi};
pub use module::CompiledModule;
pub use state::{GuestLogEntry, HostState};
