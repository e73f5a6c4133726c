//! # Neocortex - Hierarchical Temporal Memory core
//!
//! Neocortex implements the learning core of Hierarchical Temporal Memory (HTM)
//! on sparse binary vectors.
//!
//! ## Overview
//!
//! - **Sparse matrices** ([`matrix`]): coordinate/index arithmetic and sparse binary storage
//! - **Connections** ([`algorithms::Connections`]): the column, cell, segment and synapse graph
//! - **Spatial Pooler**: turns an input vector into a sparse set of active columns
//! - **Temporal Memory**: learns sequences of column activations and predicts the next one
//! - **Homeostatic Plasticity Controller**: detects when the spatial pooler has
//!   converged and freezes boosting
//!
//! ## Quick Start
//!
//! ```rust
//! use neocortex::prelude::*;
//!
//! let config = HtmConfig {
//!     input_dimensions: vec![64],
//!     column_dimensions: vec![128],
//!     potential_radius: -1,
//!     global_inhibition: true,
//!     num_active_columns_per_inh_area: 6.0,
//!     cells_per_column: 4,
//!     ..Default::default()
//! };
//!
//! let mut mem = Connections::new(config).unwrap();
//! let mut sp = SpatialPooler::new(&mut mem).unwrap();
//! let mut tm = TemporalMemory::new(&mem);
//!
//! let mut input = vec![0u8; 64];
//! input[..16].fill(1);
//!
//! let active_columns = sp.compute(&mut mem, &input, true).unwrap();
//! let cycle = tm.compute(&mut mem, &active_columns, true).unwrap();
//! assert_eq!(cycle.active_columns, active_columns);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): serialization of configuration and model state
//! - `rayon` (default): parallel spatial pooler initialisation and temporal memory activation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod algorithms;
pub mod matrix;
pub mod types;
pub mod utils;

#[cfg(feature = "serde")]
pub mod serialization;

/// Re-export of commonly used types and traits for convenience.
pub mod prelude {
    pub use crate::algorithms::{
        Cell, Column, ComputeCycle, Connections, HomeostaticPlasticityController, HtmConfig,
        HtmStatistics, SegmentActivity, SpatialPooler, TemporalMemory,
    };
    pub use crate::matrix::{
        Addressable, BinaryOverlap, ModuleTopology, SparseBinaryMatrix, SparseObjectMatrix,
        SparseStorage,
    };
    pub use crate::types::{
        CellIdx, ColumnIdx, InputIdx, Permanence, Real, Segment, Synapse, SynapseIdx, UInt,
    };
    pub use crate::utils::Random;

    #[cfg(feature = "serde")]
    pub use crate::serialization::{Serializable, SerializableFormat};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for the library.
pub mod error {
    use thiserror::Error;

    /// Main error type for neocortex operations.
    #[derive(Error, Debug)]
    pub enum NeocortexError {
        /// Invalid configuration; model construction is aborted.
        #[error("Invalid configuration '{name}': {message}")]
        Configuration {
            /// Name of the offending option.
            name: &'static str,
            /// Description of the error.
            message: String,
        },

        /// Coordinate count does not match the dimensionality.
        #[error("Invalid dimension: {0}")]
        InvalidDimension(String),

        /// Index out of bounds.
        #[error("Index {index} out of bounds (size: {size})")]
        IndexOutOfBounds {
            /// The invalid index.
            index: usize,
            /// The valid size.
            size: usize,
        },

        /// Vector length does not match the configured size.
        #[error("Dimension mismatch: expected length {expected}, got {actual}")]
        DimensionMismatch {
            /// Expected length.
            expected: usize,
            /// Actual length.
            actual: usize,
        },

        /// Serialization error.
        #[cfg(feature = "serde")]
        #[error("Serialization error: {message}")]
        SerializationError {
            /// Description of the serialization error.
            message: String,
        },

        /// I/O error.
        #[error("I/O error: {message}")]
        IoError {
            /// Description of the I/O error.
            message: String,
        },

        /// Internal error that should not occur.
        #[error("Internal error: {0}")]
        InternalError(String),
    }

    /// Result type alias using `NeocortexError`.
    pub type Result<T> = std::result::Result<T, NeocortexError>;
}

pub use error::{NeocortexError, Result};
