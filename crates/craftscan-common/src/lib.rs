//! # Craftscan Common
//!
//! Shared types used across the craftscan crates.
//!
//! This crate provides the foundational vocabulary of the engine:
//! - Item identities (`StackKey`), item classes and namespaced codes
//! - ID types (recipe ids, scan ids, context keys, container ids)
//! - Block positions for storage lookup
//! - Version information for persisted formats
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;
