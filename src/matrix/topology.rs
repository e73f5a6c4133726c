//! Index arithmetic and neighborhoods over N-dimensional shapes.

use crate::error::{NeocortexError, Result};
use crate::types::UInt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Computes the stride of each dimension.
///
/// For row-major ordering the last dimension varies fastest. Column-major
/// strides are the row-major strides of the reversed shape.
#[must_use]
pub fn dimension_multiples(dimensions: &[UInt], column_major: bool) -> Vec<usize> {
    let dims: Vec<usize> = if column_major {
        dimensions.iter().rev().map(|&d| d as usize).collect()
    } else {
        dimensions.iter().map(|&d| d as usize).collect()
    };

    let mut multiples = vec![1usize; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        multiples[i] = multiples[i + 1] * dims[i + 1];
    }
    multiples
}

fn check_coordinates(coordinates: &[UInt], dimensions: &[UInt]) -> Result<()> {
    if coordinates.len() != dimensions.len() {
        return Err(NeocortexError::InvalidDimension(format!(
            "expected {} coordinates, got {}",
            dimensions.len(),
            coordinates.len()
        )));
    }
    for (&c, &d) in coordinates.iter().zip(dimensions) {
        if c >= d {
            return Err(NeocortexError::IndexOutOfBounds {
                index: c as usize,
                size: d as usize,
            });
        }
    }
    Ok(())
}

/// Converts coordinates to a flat index.
///
/// # Errors
///
/// `InvalidDimension` when the coordinate count differs from the rank,
/// `IndexOutOfBounds` when a coordinate exceeds its dimension.
///
/// # Example
///
/// ```rust
/// use neocortex::matrix::{compute_index, dimension_multiples};
///
/// let dims = [3, 4];
/// let rows = dimension_multiples(&dims, false);
/// assert_eq!(compute_index(&[1, 2], &dims, &rows, false).unwrap(), 6);
///
/// let cols = dimension_multiples(&dims, true);
/// assert_eq!(compute_index(&[1, 2], &dims, &cols, true).unwrap(), 7);
/// ```
pub fn compute_index(
    coordinates: &[UInt],
    dimensions: &[UInt],
    multiples: &[usize],
    column_major: bool,
) -> Result<usize> {
    check_coordinates(coordinates, dimensions)?;

    let index = if column_major {
        coordinates
            .iter()
            .zip(multiples.iter().rev())
            .map(|(&c, &m)| c as usize * m)
            .sum()
    } else {
        coordinates
            .iter()
            .zip(multiples)
            .map(|(&c, &m)| c as usize * m)
            .sum()
    };
    Ok(index)
}

/// Converts a flat index to coordinates.
///
/// # Errors
///
/// `IndexOutOfBounds` when `index` is not below the element count.
pub fn compute_coordinates(
    index: usize,
    dimensions: &[UInt],
    multiples: &[usize],
    column_major: bool,
) -> Result<Vec<UInt>> {
    let size: usize = dimensions.iter().map(|&d| d as usize).product();
    if index >= size {
        return Err(NeocortexError::IndexOutOfBounds { index, size });
    }

    let mut base = index;
    let mut coordinates = Vec::with_capacity(multiples.len());
    for &m in multiples {
        coordinates.push((base / m) as UInt);
        base %= m;
    }
    if column_major {
        coordinates.reverse();
    }
    Ok(coordinates)
}

/// The shape of a module (inputs or columns) with its major ordering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModuleTopology {
    dimensions: Vec<UInt>,
    multiples: Vec<usize>,
    column_major: bool,
}

impl ModuleTopology {
    /// Creates a topology for the given shape.
    ///
    /// # Errors
    ///
    /// `InvalidDimension` when the shape is empty or contains a zero.
    pub fn new(dimensions: &[UInt], column_major: bool) -> Result<Self> {
        if dimensions.is_empty() || dimensions.contains(&0) {
            return Err(NeocortexError::InvalidDimension(format!(
                "dimensions must be non-empty and non-zero, got {dimensions:?}"
            )));
        }
        Ok(Self {
            dimensions: dimensions.to_vec(),
            multiples: dimension_multiples(dimensions, column_major),
            column_major,
        })
    }

    /// Returns the size of each dimension.
    #[inline]
    pub fn dimensions(&self) -> &[UInt] {
        &self.dimensions
    }

    /// Returns the stride of each dimension.
    #[inline]
    pub fn multiples(&self) -> &[usize] {
        &self.multiples
    }

    /// Returns true for column-major ordering.
    #[inline]
    pub fn is_column_major(&self) -> bool {
        self.column_major
    }

    /// Returns the number of elements.
    pub fn num_elements(&self) -> usize {
        self.dimensions.iter().map(|&d| d as usize).product()
    }

    /// Converts coordinates to a flat index.
    pub fn index_of(&self, coordinates: &[UInt]) -> Result<usize> {
        compute_index(coordinates, &self.dimensions, &self.multiples, self.column_major)
    }

    /// Converts a flat index to coordinates.
    pub fn coordinates_of(&self, index: usize) -> Result<Vec<UInt>> {
        compute_coordinates(index, &self.dimensions, &self.multiples, self.column_major)
    }

    /// Returns the first coordinate of a valid flat index (the matrix row).
    #[inline]
    pub fn leading_coordinate(&self, index: usize) -> usize {
        if self.column_major {
            index % self.dimensions[0] as usize
        } else {
            index / self.multiples[0]
        }
    }

    /// Returns the remaining coordinates of a valid flat index, flattened
    /// (the position within its row).
    #[inline]
    pub fn trailing_offset(&self, index: usize) -> usize {
        if self.column_major {
            index / self.dimensions[0] as usize
        } else {
            index % self.multiples[0]
        }
    }

    /// Returns the number of positions per row.
    pub fn row_len(&self) -> usize {
        self.num_elements() / self.dimensions[0] as usize
    }

    /// Returns the flat indices within `radius` of `center`, clipped at the
    /// borders. The center itself is included. Sorted ascending.
    pub fn neighborhood(&self, center: usize, radius: UInt) -> Result<Vec<usize>> {
        let coords = self.coordinates_of(center)?;
        let ranges: Vec<Vec<UInt>> = coords
            .iter()
            .zip(&self.dimensions)
            .map(|(&c, &d)| {
                let lo = c.saturating_sub(radius);
                let hi = c.saturating_add(radius).min(d - 1);
                (lo..=hi).collect()
            })
            .collect();
        self.expand(&ranges)
    }

    /// Returns the flat indices within `radius` of `center`, treating every
    /// dimension as circular. The center itself is included. Sorted ascending.
    pub fn wrapping_neighborhood(&self, center: usize, radius: UInt) -> Result<Vec<usize>> {
        let coords = self.coordinates_of(center)?;
        let ranges: Vec<Vec<UInt>> = coords
            .iter()
            .zip(&self.dimensions)
            .map(|(&c, &d)| {
                if 2 * radius as u64 + 1 >= u64::from(d) {
                    return (0..d).collect();
                }
                let d = i64::from(d);
                let c = i64::from(c);
                let r = i64::from(radius);
                let mut values: Vec<UInt> =
                    (c - r..=c + r).map(|v| v.rem_euclid(d) as UInt).collect();
                values.sort_unstable();
                values
            })
            .collect();
        self.expand(&ranges)
    }

    fn expand(&self, ranges: &[Vec<UInt>]) -> Result<Vec<usize>> {
        let mut result = Vec::new();
        let mut current = vec![0; ranges.len()];
        self.expand_recursive(ranges, 0, &mut current, &mut result)?;
        result.sort_unstable();
        result.dedup();
        Ok(result)
    }

    fn expand_recursive(
        &self,
        ranges: &[Vec<UInt>],
        dim: usize,
        current: &mut Vec<UInt>,
        result: &mut Vec<usize>,
    ) -> Result<()> {
        if dim == ranges.len() {
            result.push(self.index_of(current)?);
            return Ok(());
        }
        for &value in &ranges[dim] {
            current[dim] = value;
            self.expand_recursive(ranges, dim + 1, current, result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_major_multiples() {
        assert_eq!(dimension_multiples(&[10], false), vec![1]);
        assert_eq!(dimension_multiples(&[3, 4], false), vec![4, 1]);
        assert_eq!(dimension_multiples(&[2, 3, 4], false), vec![12, 4, 1]);
    }

    #[test]
    fn test_column_major_multiples() {
        assert_eq!(dimension_multiples(&[3, 4], true), vec![3, 1]);
        assert_eq!(dimension_multiples(&[2, 3, 4], true), vec![6, 2, 1]);
    }

    #[test]
    fn test_index_to_coordinates() {
        let t = ModuleTopology::new(&[3, 3], false).unwrap();
        assert_eq!(t.coordinates_of(0).unwrap(), vec![0, 0]);
        assert_eq!(t.coordinates_of(4).unwrap(), vec![1, 1]);
        assert_eq!(t.coordinates_of(8).unwrap(), vec![2, 2]);

        let t = ModuleTopology::new(&[2, 3, 4], false).unwrap();
        assert_eq!(t.coordinates_of(13).unwrap(), vec![1, 0, 1]);
    }

    #[test]
    fn test_column_major_index() {
        let t = ModuleTopology::new(&[2, 3], true).unwrap();
        // First coordinate varies fastest.
        assert_eq!(t.index_of(&[0, 0]).unwrap(), 0);
        assert_eq!(t.index_of(&[1, 0]).unwrap(), 1);
        assert_eq!(t.index_of(&[0, 1]).unwrap(), 2);
        assert_eq!(t.index_of(&[1, 2]).unwrap(), 5);
        assert_eq!(t.coordinates_of(3).unwrap(), vec![1, 1]);
    }

    #[test]
    fn test_round_trip_both_orderings() {
        for &column_major in &[false, true] {
            let t = ModuleTopology::new(&[3, 4, 5], column_major).unwrap();
            for i in 0..60 {
                let coords = t.coordinates_of(i).unwrap();
                assert_eq!(t.index_of(&coords).unwrap(), i);
            }
        }
    }

    #[test]
    fn test_wrong_rank_is_invalid_dimension() {
        let t = ModuleTopology::new(&[3, 4], false).unwrap();
        assert!(matches!(
            t.index_of(&[1]),
            Err(NeocortexError::InvalidDimension(_))
        ));
        assert!(matches!(
            t.index_of(&[1, 2, 3]),
            Err(NeocortexError::InvalidDimension(_))
        ));
    }

    #[test]
    fn test_out_of_range() {
        let t = ModuleTopology::new(&[3, 4], false).unwrap();
        assert!(matches!(
            t.index_of(&[3, 0]),
            Err(NeocortexError::IndexOutOfBounds { index: 3, size: 3 })
        ));
        assert!(matches!(
            t.coordinates_of(12),
            Err(NeocortexError::IndexOutOfBounds { index: 12, size: 12 })
        ));
    }

    #[test]
    fn test_empty_dimensions_rejected() {
        assert!(ModuleTopology::new(&[], false).is_err());
        assert!(ModuleTopology::new(&[4, 0], false).is_err());
    }

    #[test]
    fn test_leading_and_trailing() {
        let rows = ModuleTopology::new(&[3, 4], false).unwrap();
        let idx = rows.index_of(&[2, 1]).unwrap();
        assert_eq!(rows.leading_coordinate(idx), 2);
        assert_eq!(rows.trailing_offset(idx), 1);

        let cols = ModuleTopology::new(&[3, 4], true).unwrap();
        let idx = cols.index_of(&[2, 1]).unwrap();
        assert_eq!(cols.leading_coordinate(idx), 2);
        assert_eq!(cols.trailing_offset(idx), 1);
    }

    #[test]
    fn test_neighborhood_1d() {
        let t = ModuleTopology::new(&[10], false).unwrap();
        assert_eq!(t.neighborhood(5, 2).unwrap(), vec![3, 4, 5, 6, 7]);
        assert_eq!(t.neighborhood(0, 2).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_wrapping_neighborhood_1d() {
        let t = ModuleTopology::new(&[10], false).unwrap();
        assert_eq!(t.wrapping_neighborhood(0, 2).unwrap(), vec![0, 1, 2, 8, 9]);
        // Radius wider than the dimension covers it exactly once.
        assert_eq!(t.wrapping_neighborhood(3, 7).unwrap().len(), 10);
    }

    #[test]
    fn test_neighborhood_2d() {
        let t = ModuleTopology::new(&[3, 3], false).unwrap();
        assert_eq!(t.neighborhood(4, 1).unwrap().len(), 9);
        assert_eq!(t.neighborhood(0, 1).unwrap(), vec![0, 1, 3, 4]);
        assert_eq!(t.wrapping_neighborhood(0, 1).unwrap().len(), 9);
    }
}
