//! Shared foundational types used across the kiln materialization pipeline.
//!
//! This crate provides the core identifiers: content digests for
//! cache addressing and dotted unit names for the two-tier unit namespace.

#![warn(missing_docs)]

pub mod digest;
pub mod unit_name;

pub use digest::ContentDigest;
pub use unit_name::UnitName;
