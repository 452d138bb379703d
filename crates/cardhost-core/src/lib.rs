//! Core types for the cardhost card-device stack.
//!
//! This crate defines the leaf value types shared by every other crate in
//! the workspace: device identifiers, USB vendor/product id pairs, and the
//! physical descriptor that distinguishes one physically connected device
//! from another. It deliberately has no I/O and no async dependencies so
//! that higher layers (bus backends, the device registry, UIs) can agree
//! on vocabulary without pulling in each other's stacks.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
