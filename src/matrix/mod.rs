//! Sparse matrix layer.
//!
//! Maps between N-dimensional coordinates and flat indices (row- or
//! column-major) and stores sparse binary or object data addressed by those
//! indices. No learning logic lives here.
//!
//! The layer is built from three small traits rather than a class hierarchy:
//!
//! - [`Addressable`]: coordinate <-> flat index arithmetic
//! - [`SparseStorage`]: get/set by flat index
//! - [`BinaryOverlap`]: OR / all / any / AND-count over sets of flat indices

mod binary;
mod object;
mod topology;

pub use binary::SparseBinaryMatrix;
pub use object::SparseObjectMatrix;
pub use topology::{compute_coordinates, compute_index, dimension_multiples, ModuleTopology};

use crate::error::Result;
use crate::types::UInt;

/// Coordinate <-> flat index arithmetic over a fixed shape.
pub trait Addressable {
    /// Returns the topology describing the shape and the major ordering.
    fn topology(&self) -> &ModuleTopology;

    /// Returns the size of each dimension.
    fn dimensions(&self) -> &[UInt] {
        self.topology().dimensions()
    }

    /// Returns the number of dimensions.
    fn num_dimensions(&self) -> usize {
        self.topology().dimensions().len()
    }

    /// Returns the number of addressable elements.
    fn max_index(&self) -> usize {
        self.topology().num_elements()
    }

    /// Converts coordinates to a flat index.
    fn compute_index(&self, coordinates: &[UInt]) -> Result<usize> {
        self.topology().index_of(coordinates)
    }

    /// Converts a flat index to coordinates.
    fn compute_coordinates(&self, index: usize) -> Result<Vec<UInt>> {
        self.topology().coordinates_of(index)
    }
}

/// Storage of values addressed by flat index.
pub trait SparseStorage<T> {
    /// Returns the value stored at `index`, or `None` when nothing is stored there.
    fn get(&self, index: usize) -> Option<&T>;

    /// Stores `value` at `index`.
    fn set(&mut self, index: usize, value: T) -> Result<()>;

    /// Returns the flat indices holding a value, in ascending order.
    fn sparse_indices(&self) -> Vec<usize>;

    /// Returns the number of stored values.
    fn stored_len(&self) -> usize {
        self.sparse_indices().len()
    }
}

/// Set-like operations over a binary matrix.
pub trait BinaryOverlap {
    /// Sets every bit in `indices`.
    fn or(&mut self, indices: &[usize]) -> Result<()>;

    /// Returns true when every bit in `indices` is set.
    fn all(&self, indices: &[usize]) -> bool;

    /// Returns true when at least one bit in `indices` is set.
    fn any(&self, indices: &[usize]) -> bool;

    /// Counts the bits in `indices` that are set.
    fn and_count(&self, indices: &[usize]) -> usize;
}
