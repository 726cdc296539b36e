//! # Ember Core
//!
//! Shared infrastructure for the Ember JIT compiler:
//!
//! - **Error Handling**: The `JitError` hierarchy and `JitResult` alias
//! - **Logging**: Logger installation over the `log` facade

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod logging;

pub use error::{JitError, JitResult};

/// Ember runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
