//! Core types for the HTM library.
//!
//! Index aliases and permanence constants shared by the sparse matrices,
//! the connections graph and both engines.

mod primitives;

pub use primitives::*;
