//! Utility modules for the HTM library.
//!
//! Seeded random number generation and small SDR helpers.

mod random;
mod sdr_ops;

pub use random::Random;
pub use sdr_ops::{mean_abs_delta, overlap, similarity, to_dense, to_sparse};
