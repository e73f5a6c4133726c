//! Homeostatic Plasticity Controller.
//!
//! Watches the spatial pooler while it learns and reports when every input it
//! has seen maps to a stable SDR. After `min_cycles` it freezes boosting in the
//! shared configuration.

use super::HtmConfig;
use crate::error::{NeocortexError, Result};
use crate::utils::{mean_abs_delta, similarity, to_sparse};
use sha2::{Digest, Sha256};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of recent active-column counts kept per input.
const WINDOW: usize = 5;

/// Callback fired on stability transitions with
/// `(is_stable, num_patterns, avg_derivation, cycle)`.
pub type StabilityCallback = Box<dyn FnMut(bool, usize, f64, u64) + Send>;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
struct PatternState {
    last_output: Vec<u32>,
    counts: VecDeque<usize>,
    stable_cycles: usize,
}

/// Detects convergence of the spatial pooler.
///
/// # Example
///
/// ```rust
/// use neocortex::algorithms::{HomeostaticPlasticityController, HtmConfig};
///
/// let mut config = HtmConfig::default();
/// let mut hpc = HomeostaticPlasticityController::new(2, 1, 0.96).unwrap();
/// let input = [1u8, 0, 1, 0];
/// let output = [0u8, 1, 1, 0, 0];
///
/// for _ in 0..5 {
///     hpc.compute(&mut config, &input, &output);
/// }
/// assert!(hpc.is_stable());
/// assert_eq!(config.max_boost, 0.0);
/// ```
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HomeostaticPlasticityController {
    min_cycles: u64,
    required_stable_cycles: usize,
    similarity_threshold: f64,
    cycle: u64,
    is_stable: bool,
    boosting_frozen: bool,
    patterns: BTreeMap<u64, PatternState>,
    #[cfg_attr(feature = "serde", serde(skip))]
    on_stability_changed: Option<StabilityCallback>,
}

impl fmt::Debug for HomeostaticPlasticityController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HomeostaticPlasticityController")
            .field("min_cycles", &self.min_cycles)
            .field("required_stable_cycles", &self.required_stable_cycles)
            .field("similarity_threshold", &self.similarity_threshold)
            .field("cycle", &self.cycle)
            .field("is_stable", &self.is_stable)
            .field("num_patterns", &self.patterns.len())
            .field("has_callback", &self.on_stability_changed.is_some())
            .finish()
    }
}

impl Default for HomeostaticPlasticityController {
    fn default() -> Self {
        Self {
            min_cycles: 50,
            required_stable_cycles: 50,
            similarity_threshold: 0.96,
            cycle: 0,
            is_stable: false,
            boosting_frozen: false,
            patterns: BTreeMap::new(),
            on_stability_changed: None,
        }
    }
}

impl HomeostaticPlasticityController {
    /// Creates a controller.
    ///
    /// # Errors
    ///
    /// `Configuration` when `similarity_threshold` is outside `[0, 1]`.
    pub fn new(
        min_cycles: u64,
        required_stable_cycles: usize,
        similarity_threshold: f64,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(NeocortexError::Configuration {
                name: "similarity_threshold",
                message: format!("{similarity_threshold} is outside [0, 1]"),
            });
        }
        Ok(Self {
            min_cycles,
            required_stable_cycles,
            similarity_threshold,
            ..Default::default()
        })
    }

    /// Registers the stability transition callback.
    pub fn on_stability_changed<F>(&mut self, callback: F)
    where
        F: FnMut(bool, usize, f64, u64) + Send + 'static,
    {
        self.on_stability_changed = Some(Box::new(callback));
    }

    /// Input key: the leading 8 bytes of the SHA-256 digest, big-endian.
    fn key(input: &[u8]) -> u64 {
        let digest: [u8; 32] = Sha256::digest(input).into();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }

    /// Feeds one learning cycle: the dense input and the dense active-column
    /// output it produced. Returns whether the pooler is stable.
    pub fn compute(&mut self, config: &mut HtmConfig, input: &[u8], output: &[u8]) -> bool {
        if self.cycle >= self.min_cycles && !self.boosting_frozen {
            config.max_boost = 0.0;
            config.min_pct_overlap_duty_cycles = 0.0;
            self.boosting_frozen = true;
            log::info!("[HPC] boosting frozen at cycle {}", self.cycle);
        }

        let active = to_sparse(output);
        let count = active.len();
        let threshold = self.similarity_threshold;

        match self.patterns.entry(Self::key(input)) {
            Entry::Vacant(entry) => {
                entry.insert(PatternState {
                    last_output: active,
                    counts: std::iter::repeat(count).take(WINDOW).collect(),
                    stable_cycles: 0,
                });
            }
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();
                state.counts.pop_front();
                state.counts.push_back(count);

                let similar = similarity(&state.last_output, &active) > threshold;
                state.last_output = active;

                if similar {
                    let counts: Vec<usize> = state.counts.iter().copied().collect();
                    if mean_abs_delta(&counts) <= 0.0 {
                        state.stable_cycles += 1;
                    } else {
                        state.stable_cycles = 0;
                    }
                } else {
                    state.stable_cycles = 0;
                }
            }
        }

        let all_stable = self.cycle >= self.min_cycles
            && self
                .patterns
                .values()
                .all(|p| p.stable_cycles > self.required_stable_cycles);

        if all_stable != self.is_stable {
            self.is_stable = all_stable;
            let derivation = self.avg_derivation();
            log::info!(
                "[HPC] {} at cycle {} ({} patterns, avg derivation {:.3})",
                if all_stable { "stable" } else { "unstable" },
                self.cycle,
                self.patterns.len(),
                derivation
            );
            if let Some(callback) = self.on_stability_changed.as_mut() {
                callback(all_stable, self.patterns.len(), derivation, self.cycle);
            }
        }

        self.cycle += 1;
        self.is_stable
    }

    fn avg_derivation(&self) -> f64 {
        if self.patterns.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .patterns
            .values()
            .map(|p| {
                let counts: Vec<usize> = p.counts.iter().copied().collect();
                mean_abs_delta(&counts)
            })
            .sum();
        total / self.patterns.len() as f64
    }

    /// Returns whether every seen input is stable.
    pub fn is_stable(&self) -> bool {
        self.is_stable
    }

    /// Returns the number of processed cycles.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Returns the number of distinct inputs seen.
    pub fn num_patterns(&self) -> usize {
        self.patterns.len()
    }

    /// Returns the consecutive stable cycles of an input, if it was seen.
    pub fn stable_cycles(&self, input: &[u8]) -> Option<usize> {
        self.patterns.get(&Self::key(input)).map(|p| p.stable_cycles)
    }
}
