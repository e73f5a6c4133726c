//! Sparse matrix of arbitrary objects.

use super::{Addressable, ModuleTopology, SparseStorage};
use crate::error::{NeocortexError, Result};
use crate::types::UInt;

use ahash::AHashMap;

/// A matrix holding objects at a sparse set of flat indices.
///
/// The spatial pooler uses one over the column space to cache the
/// inhibition neighborhood of each column it has visited.
#[derive(Debug, Clone, Default)]
pub struct SparseObjectMatrix<T> {
    topology: ModuleTopology,
    items: AHashMap<usize, T>,
}

impl<T> SparseObjectMatrix<T> {
    /// Creates an empty matrix.
    pub fn new(dimensions: &[UInt], column_major: bool) -> Result<Self> {
        Ok(Self {
            topology: ModuleTopology::new(dimensions, column_major)?,
            items: AHashMap::new(),
        })
    }

    /// Creates an empty matrix over an existing topology.
    pub fn with_topology(topology: ModuleTopology) -> Self {
        Self {
            topology,
            items: AHashMap::new(),
        }
    }

    /// Returns the object at the given coordinates.
    pub fn get_at(&self, coordinates: &[UInt]) -> Result<Option<&T>> {
        let index = self.compute_index(coordinates)?;
        Ok(self.items.get(&index))
    }

    /// Returns a mutable reference to the object at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(&index)
    }

    /// Returns the object at `index`, computing and storing it first when absent.
    pub fn get_or_try_insert_with<F>(&mut self, index: usize, f: F) -> Result<&T>
    where
        F: FnOnce(usize) -> Result<T>,
    {
        let size = self.max_index();
        if index >= size {
            return Err(NeocortexError::IndexOutOfBounds { index, size });
        }
        if !self.items.contains_key(&index) {
            let value = f(index)?;
            self.items.insert(index, value);
        }
        self.items
            .get(&index)
            .ok_or_else(|| NeocortexError::InternalError(format!("missing object at {index}")))
    }

    /// Removes and returns the object at `index`.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.items.remove(&index)
    }

    /// Removes every object.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Returns true when no object is stored.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Addressable for SparseObjectMatrix<T> {
    fn topology(&self) -> &ModuleTopology {
        &self.topology
    }
}

impl<T> SparseStorage<T> for SparseObjectMatrix<T> {
    fn get(&self, index: usize) -> Option<&T> {
        self.items.get(&index)
    }

    fn set(&mut self, index: usize, value: T) -> Result<()> {
        let size = self.max_index();
        if index >= size {
            return Err(NeocortexError::IndexOutOfBounds { index, size });
        }
        self.items.insert(index, value);
        Ok(())
    }

    fn sparse_indices(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = self.items.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    fn stored_len(&self) -> usize {
        self.items.len()
    }
}
