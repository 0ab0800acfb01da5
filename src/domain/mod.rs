//! Domain layer containing protocol types and connection primitives.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, principals, lifecycle states, errors)
//! - `protocol` - Envelopes, message kinds, registries and payload schemas
//!
//! Nothing in this layer performs I/O.

pub mod foundation;
pub mod protocol;
