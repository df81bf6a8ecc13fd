//! Host bindings for script-host.
//!
//! This crate provides the host side of the guest import surface:
//! - [`HostBindingRegistry`]: named bindings with fixed numeric
//!   signatures, frozen once linking happens
//! - [`logging`]: the required `env::js_print` binding with mandatory
//!   bounds validation
//!
//! # Security model
//!
//! Every offset and length arriving from the guest is validated
//! against the current linear-memory size before any read. The guest
//! controls these values; they are never trusted blindly.

pub mod logging;
pub mod registry;

pub use logging::{IMPORT_NAMESPACE, IMPORT_PRINT, default_registry, register_print};
pub use registry::{BindingSignature, HostBinding, HostBindingRegistry, NumType};
