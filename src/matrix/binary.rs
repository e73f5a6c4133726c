//! Sparse binary matrix with per-row true counts.

use super::{Addressable, BinaryOverlap, ModuleTopology, SparseStorage};
use crate::error::{NeocortexError, Result};
use crate::types::UInt;

use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A binary matrix storing only its set bits.
///
/// A row is the set of flat indices sharing the first coordinate. Bits are kept
/// per row as their position within the row, so the true count of a row is the
/// size of its set.
///
/// The spatial pooler keeps one row per column, holding the input bits that
/// column is connected to.
///
/// # Example
///
/// ```rust
/// use neocortex::matrix::{BinaryOverlap, SparseBinaryMatrix};
///
/// let mut m = SparseBinaryMatrix::new(&[2, 4], false).unwrap();
/// m.or(&[1, 2, 5]).unwrap();
///
/// assert_eq!(m.true_count(0), 2);
/// assert_eq!(m.right_vec_sum_at_nz(&[0, 1, 1, 0], 0.0).unwrap(), vec![2, 1]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SparseBinaryMatrix {
    topology: ModuleTopology,
    rows: Vec<BTreeSet<usize>>,
}

impl SparseBinaryMatrix {
    /// Creates an all-zero matrix.
    pub fn new(dimensions: &[UInt], column_major: bool) -> Result<Self> {
        let topology = ModuleTopology::new(dimensions, column_major)?;
        let rows = vec![BTreeSet::new(); dimensions[0] as usize];
        Ok(Self { topology, rows })
    }

    /// Creates a matrix from a dense 0/1 vector laid out by flat index.
    pub fn from_dense(dimensions: &[UInt], column_major: bool, dense: &[u8]) -> Result<Self> {
        let mut matrix = Self::new(dimensions, column_major)?;
        if dense.len() != matrix.max_index() {
            return Err(NeocortexError::DimensionMismatch {
                expected: matrix.max_index(),
                actual: dense.len(),
            });
        }
        for (index, _) in dense.iter().enumerate().filter(|(_, v)| **v != 0) {
            matrix.set_bit(index, true)?;
        }
        Ok(matrix)
    }

    /// Returns the matrix as a dense 0/1 vector laid out by flat index.
    pub fn to_dense(&self) -> Vec<u8> {
        let mut dense = vec![0u8; self.max_index()];
        for index in self.sparse_indices() {
            dense[index] = 1;
        }
        dense
    }

    /// Returns the number of rows.
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Returns the number of positions within a row.
    #[inline]
    pub fn row_len(&self) -> usize {
        self.topology.row_len()
    }

    fn flat_index(&self, row: usize, offset: usize) -> usize {
        if self.topology.is_column_major() {
            row + offset * self.rows.len()
        } else {
            row * self.row_len() + offset
        }
    }

    fn check_index(&self, index: usize) -> Result<()> {
        let size = self.max_index();
        if index >= size {
            return Err(NeocortexError::IndexOutOfBounds { index, size });
        }
        Ok(())
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row >= self.rows.len() {
            return Err(NeocortexError::IndexOutOfBounds {
                index: row,
                size: self.rows.len(),
            });
        }
        Ok(())
    }

    /// Returns whether the bit at `index` is set. Out-of-range indices read as unset.
    pub fn is_set(&self, index: usize) -> bool {
        if index >= self.max_index() {
            return false;
        }
        let row = self.topology.leading_coordinate(index);
        self.rows[row].contains(&self.topology.trailing_offset(index))
    }

    /// Sets or clears the bit at `index`.
    pub fn set_bit(&mut self, index: usize, value: bool) -> Result<()> {
        self.check_index(index)?;
        let row = self.topology.leading_coordinate(index);
        let offset = self.topology.trailing_offset(index);
        if value {
            self.rows[row].insert(offset);
        } else {
            self.rows[row].remove(&offset);
        }
        Ok(())
    }

    /// Replaces the content of a row with the given in-row positions.
    pub fn set_row<I>(&mut self, row: usize, offsets: I) -> Result<()>
    where
        I: IntoIterator<Item = usize>,
    {
        self.check_row(row)?;
        let row_len = self.row_len();
        let mut bits = BTreeSet::new();
        for offset in offsets {
            if offset >= row_len {
                return Err(NeocortexError::IndexOutOfBounds {
                    index: offset,
                    size: row_len,
                });
            }
            bits.insert(offset);
        }
        self.rows[row] = bits;
        Ok(())
    }

    /// Clears every bit of a row.
    pub fn clear_row(&mut self, row: usize) -> Result<()> {
        self.check_row(row)?;
        self.rows[row].clear();
        Ok(())
    }

    /// Returns the in-row positions set in `row`, ascending.
    pub fn row_offsets(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        self.rows.get(row).into_iter().flat_map(|bits| bits.iter().copied())
    }

    /// Returns the number of set bits in `row`.
    #[inline]
    pub fn true_count(&self, row: usize) -> usize {
        self.rows.get(row).map_or(0, BTreeSet::len)
    }

    /// Returns the number of set bits of every row.
    pub fn true_counts(&self) -> Vec<u32> {
        self.rows.iter().map(|bits| bits.len() as u32).collect()
    }

    /// For every row, counts the set bits whose in-row position is non-zero in
    /// `vector`. Counts below `stimulus_threshold` are reported as zero.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when `vector` is not one row long.
    pub fn right_vec_sum_at_nz(&self, vector: &[u8], stimulus_threshold: f64) -> Result<Vec<u32>> {
        if vector.len() != self.row_len() {
            return Err(NeocortexError::DimensionMismatch {
                expected: self.row_len(),
                actual: vector.len(),
            });
        }
        Ok(self
            .rows
            .iter()
            .map(|bits| {
                let count = bits.iter().filter(|&&offset| vector[offset] != 0).count() as u32;
                if f64::from(count) < stimulus_threshold {
                    0
                } else {
                    count
                }
            })
            .collect())
    }

    /// Returns the flat indices whose coordinates start with `prefix`, ascending.
    ///
    /// # Errors
    ///
    /// `InvalidDimension` when the prefix is longer than the rank,
    /// `IndexOutOfBounds` when a prefix coordinate exceeds its dimension.
    pub fn slice_indices(&self, prefix: &[UInt]) -> Result<Vec<usize>> {
        let dims = self.topology.dimensions();
        if prefix.len() > dims.len() {
            return Err(NeocortexError::InvalidDimension(format!(
                "slice prefix of {} coordinates exceeds rank {}",
                prefix.len(),
                dims.len()
            )));
        }
        for (&c, &d) in prefix.iter().zip(dims) {
            if c >= d {
                return Err(NeocortexError::IndexOutOfBounds {
                    index: c as usize,
                    size: d as usize,
                });
            }
        }

        let mut indices = Vec::new();
        let mut coords = prefix.to_vec();
        coords.resize(dims.len(), 0);
        self.slice_recursive(prefix.len(), &mut coords, &mut indices)?;
        indices.sort_unstable();
        Ok(indices)
    }

    fn slice_recursive(&self, dim: usize, coords: &mut Vec<UInt>, out: &mut Vec<usize>) -> Result<()> {
        if dim == coords.len() {
            out.push(self.topology.index_of(coords)?);
            return Ok(());
        }
        for value in 0..self.topology.dimensions()[dim] {
            coords[dim] = value;
            self.slice_recursive(dim + 1, coords, out)?;
        }
        Ok(())
    }

    /// Returns the 0/1 values of the slice starting with `prefix`.
    pub fn slice(&self, prefix: &[UInt]) -> Result<Vec<u8>> {
        Ok(self
            .slice_indices(prefix)?
            .into_iter()
            .map(|index| u8::from(self.is_set(index)))
            .collect())
    }
}

impl Addressable for SparseBinaryMatrix {
    fn topology(&self) -> &ModuleTopology {
        &self.topology
    }
}

impl SparseStorage<bool> for SparseBinaryMatrix {
    fn get(&self, index: usize) -> Option<&bool> {
        if index >= self.max_index() {
            None
        } else if self.is_set(index) {
            Some(&true)
        } else {
            Some(&false)
        }
    }

    fn set(&mut self, index: usize, value: bool) -> Result<()> {
        self.set_bit(index, value)
    }

    fn sparse_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .flat_map(|(row, bits)| bits.iter().map(move |&offset| (row, offset)))
            .map(|(row, offset)| self.flat_index(row, offset))
            .collect();
        indices.sort_unstable();
        indices
    }

    fn stored_len(&self) -> usize {
        self.rows.iter().map(BTreeSet::len).sum()
    }
}

impl BinaryOverlap for SparseBinaryMatrix {
    fn or(&mut self, indices: &[usize]) -> Result<()> {
        for &index in indices {
            self.set_bit(index, true)?;
        }
        Ok(())
    }

    fn all(&self, indices: &[usize]) -> bool {
        indices.iter().all(|&index| self.is_set(index))
    }

    fn any(&self, indices: &[usize]) -> bool {
        indices.iter().any(|&index| self.is_set(index))
    }

    fn and_count(&self, indices: &[usize]) -> usize {
        indices.iter().filter(|&&index| self.is_set(index)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_true_counts_follow_sets() {
        let mut m = SparseBinaryMatrix::new(&[3, 5], false).unwrap();
        m.set_bit(0, true).unwrap();
        m.set_bit(4, true).unwrap();
        m.set_bit(7, true).unwrap();
        assert_eq!(m.true_counts(), vec![2, 1, 0]);

        m.set_bit(4, false).unwrap();
        m.set_bit(4, false).unwrap();
        assert_eq!(m.true_counts(), vec![1, 1, 0]);
        assert_eq!(m.stored_len(), 2);
    }

    #[test]
    fn test_column_major_rows() {
        let mut m = SparseBinaryMatrix::new(&[3, 5], true).unwrap();
        // (row 1, offset 2) lives at 1 + 2 * 3 in column-major order.
        let index = m.compute_index(&[1, 2]).unwrap();
        assert_eq!(index, 7);
        m.set_bit(index, true).unwrap();
        assert_eq!(m.true_count(1), 1);
        assert_eq!(m.row_offsets(1).collect::<Vec<_>>(), vec![2]);
        assert_eq!(m.sparse_indices(), vec![7]);
    }

    #[test]
    fn test_set_row_replaces() {
        let mut m = SparseBinaryMatrix::new(&[2, 4], false).unwrap();
        m.set_row(1, vec![0, 3]).unwrap();
        assert_eq!(m.sparse_indices(), vec![4, 7]);
        m.set_row(1, vec![2]).unwrap();
        assert_eq!(m.sparse_indices(), vec![6]);
        assert!(m.set_row(1, vec![4]).is_err());
        assert!(m.set_row(2, vec![0]).is_err());
        m.clear_row(1).unwrap();
        assert_eq!(m.true_count(1), 0);
    }

    #[test]
    fn test_right_vec_sum_with_threshold() {
        let mut m = SparseBinaryMatrix::new(&[3, 4], false).unwrap();
        m.set_row(0, vec![0, 1, 2]).unwrap();
        m.set_row(1, vec![1]).unwrap();
        m.set_row(2, vec![3]).unwrap();

        let input = [1, 1, 1, 0];
        assert_eq!(m.right_vec_sum_at_nz(&input, 0.0).unwrap(), vec![3, 1, 0]);
        assert_eq!(m.right_vec_sum_at_nz(&input, 2.0).unwrap(), vec![3, 0, 0]);
        assert!(matches!(
            m.right_vec_sum_at_nz(&[1, 1], 0.0),
            Err(NeocortexError::DimensionMismatch { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_slice() {
        let mut m = SparseBinaryMatrix::new(&[2, 3], false).unwrap();
        m.or(&[1, 5]).unwrap();
        assert_eq!(m.slice_indices(&[1]).unwrap(), vec![3, 4, 5]);
        assert_eq!(m.slice(&[0]).unwrap(), vec![0, 1, 0]);
        assert_eq!(m.slice(&[1]).unwrap(), vec![0, 0, 1]);
        assert_eq!(m.slice_indices(&[]).unwrap().len(), 6);
        assert!(m.slice_indices(&[2]).is_err());
        assert!(m.slice_indices(&[0, 1, 0]).is_err());
    }

    #[test]
    fn test_overlap_ops() {
        let mut m = SparseBinaryMatrix::new(&[10], false).unwrap();
        m.or(&[1, 3, 5]).unwrap();
        assert!(m.all(&[1, 5]));
        assert!(!m.all(&[1, 2]));
        assert!(m.any(&[2, 3]));
        assert!(!m.any(&[0, 2, 42]));
        assert_eq!(m.and_count(&[0, 1, 3, 4]), 2);
        assert!(m.or(&[10]).is_err());
    }

    #[test]
    fn test_dense_round_trip() {
        let dense = vec![0, 1, 0, 0, 1, 1];
        let m = SparseBinaryMatrix::from_dense(&[2, 3], false, &dense).unwrap();
        assert_eq!(m.to_dense(), dense);
        assert_eq!(m.get(4), Some(&true));
        assert_eq!(m.get(0), Some(&false));
        assert_eq!(m.get(6), None);
        assert!(SparseBinaryMatrix::from_dense(&[2, 3], false, &[1]).is_err());
    }
}
