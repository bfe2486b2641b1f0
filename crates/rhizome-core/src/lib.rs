//! Rhizome wire primitives — fixed-width identifier types, little-endian
//! integer codecs, and daemon configuration.
//!
//! These types ARE the protocol: every size here is load-bearing for the
//! manifest text format and the database schema in the rest of the
//! workspace. Changing a width here is a breaking change.

pub mod config;
pub mod error;
pub mod ids;
pub mod leint;

pub use error::CoreError;
