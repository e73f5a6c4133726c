//! Primitive type definitions for HTM algorithms.
//!
//! Every entity in the connections graph is addressed by a plain integer id into
//! an arena owned by [`Connections`](crate::algorithms::Connections).

/// 32-bit unsigned integer.
pub type UInt32 = u32;

/// 64-bit unsigned integer.
pub type UInt64 = u64;

/// 64-bit floating point number.
pub type Real64 = f64;

/// Default unsigned integer type, used for dimension sizes and coordinates.
pub type UInt = UInt32;

/// Default floating point type.
pub type Real = Real64;

/// Index of a column in the column space.
pub type ColumnIdx = UInt32;

/// Index of a cell. Cells of column `c` occupy `c * cells_per_column ..`.
pub type CellIdx = UInt32;

/// Index of an input bit.
pub type InputIdx = UInt32;

/// Unique identifier for a segment in the connections flat list.
pub type Segment = UInt32;

/// Unique identifier for a synapse in the connections flat list.
pub type Synapse = UInt32;

/// Number of synapses (per segment counts).
pub type SynapseIdx = UInt32;

/// Synapse permanence value (0.0 to 1.0).
pub type Permanence = Real64;

/// Minimum permanence value.
pub const MIN_PERMANENCE: Permanence = 0.0;

/// Maximum permanence value.
pub const MAX_PERMANENCE: Permanence = 1.0;

/// Permanences below this value are treated as zero and their synapses destroyed.
pub const EPSILON: Permanence = 0.00001;
