//! Foundation types for genvault.
//!
//! Every other genvault crate depends on `genvault-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Opaque identifier naming one immutable stored object
//! - [`validate_host_name`] -- Host names double as repository path components

pub mod error;
pub mod names;
pub mod object;

pub use error::TypeError;
pub use names::validate_host_name;
pub use object::ObjectId;
