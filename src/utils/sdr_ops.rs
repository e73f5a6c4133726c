//! Helpers over SDRs held as dense 0/1 vectors or sorted index lists.

/// Returns the indices of the non-zero entries of a dense vector.
///
/// # Example
///
/// ```rust
/// use neocortex::utils::{to_dense, to_sparse};
///
/// let dense = to_dense(&[1, 4], 6);
/// assert_eq!(dense, vec![0, 1, 0, 0, 1, 0]);
/// assert_eq!(to_sparse(&dense), vec![1, 4]);
/// ```
pub fn to_sparse(dense: &[u8]) -> Vec<u32> {
    dense
        .iter()
        .enumerate()
        .filter(|(_, v)| **v != 0)
        .map(|(i, _)| i as u32)
        .collect()
}

/// Returns a dense 0/1 vector of length `len` with the given indices set.
/// Indices outside the vector are ignored.
pub fn to_dense(sparse: &[u32], len: usize) -> Vec<u8> {
    let mut dense = vec![0u8; len];
    for &i in sparse {
        if let Some(bit) = dense.get_mut(i as usize) {
            *bit = 1;
        }
    }
    dense
}

/// Counts the indices present in both sorted lists.
pub fn overlap(a: &[u32], b: &[u32]) -> usize {
    let (mut i, mut j, mut count) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                count += 1;
                i += 1;
                j += 1;
            }
        }
    }
    count
}

/// Fraction of shared active bits, normalized by the larger of the two SDRs.
///
/// Two empty SDRs are identical (1.0); an empty and a non-empty one share
/// nothing (0.0).
pub fn similarity(a: &[u32], b: &[u32]) -> f64 {
    let larger = a.len().max(b.len());
    if larger == 0 {
        return 1.0;
    }
    overlap(a, b) as f64 / larger as f64
}

/// Mean absolute difference between neighboring values, normalized by the
/// number of values.
pub fn mean_abs_delta(values: &[usize]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum: usize = values.windows(2).map(|w| w[0].abs_diff(w[1])).sum();
    sum as f64 / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_sparse_round_trip() {
        let sparse = vec![0, 3, 7];
        assert_eq!(to_sparse(&to_dense(&sparse, 8)), sparse);
        assert_eq!(to_dense(&[9], 4), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_overlap() {
        assert_eq!(overlap(&[1, 3, 5, 7], &[3, 4, 5]), 2);
        assert_eq!(overlap(&[], &[1]), 0);
    }

    #[test]
    fn test_similarity() {
        assert!((similarity(&[1, 2, 3, 4], &[1, 2, 3, 4]) - 1.0).abs() < 1e-12);
        assert!((similarity(&[1, 2, 3, 4], &[1, 2]) - 0.5).abs() < 1e-12);
        assert!((similarity(&[], &[]) - 1.0).abs() < 1e-12);
        assert!(similarity(&[], &[1]).abs() < 1e-12);
    }

    #[test]
    fn test_mean_abs_delta() {
        assert!(mean_abs_delta(&[5, 5, 5, 5, 5]).abs() < 1e-12);
        // |4-6| + |6-6| = 2 over 3 values
        assert!((mean_abs_delta(&[4, 6, 6]) - 2.0 / 3.0).abs() < 1e-12);
        assert!(mean_abs_delta(&[]).abs() < 1e-12);
    }
}
