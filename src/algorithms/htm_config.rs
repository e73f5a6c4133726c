//! Configuration shared by the spatial pooler and the temporal memory.

use crate::error::{NeocortexError, Result};
use crate::matrix::ModuleTopology;
use crate::types::{Permanence, Real, UInt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of an HTM model.
///
/// One configuration is owned by [`Connections`](super::Connections) and
/// borrowed by both engines. Only the homeostatic plasticity controller
/// changes it after construction, to freeze boosting.
///
/// # Example
///
/// ```rust
/// use neocortex::algorithms::HtmConfig;
///
/// let config = HtmConfig {
///     input_dimensions: vec![32, 32],
///     column_dimensions: vec![64, 64],
///     global_inhibition: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// assert_eq!(config.num_columns(), 4096);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HtmConfig {
    // Topology
    /// Dimensions of the input space.
    pub input_dimensions: Vec<UInt>,
    /// Dimensions of the column space.
    pub column_dimensions: Vec<UInt>,
    /// Column-major ordering of both spaces when true.
    pub is_column_major: bool,

    // Spatial pooler
    /// Radius of the input neighborhood a column may connect to. -1 means the whole input.
    pub potential_radius: i32,
    /// Fraction of the input neighborhood drawn into a column's potential pool.
    pub potential_pct: Real,
    /// All columns compete in a single inhibition area when true.
    pub global_inhibition: bool,
    /// Target fraction of active columns per inhibition area. Used when > 0.
    pub local_area_density: Real,
    /// Number of active columns per inhibition area. Used when `local_area_density <= 0`.
    pub num_active_columns_per_inh_area: Real,
    /// Upper bound of the inhibition density.
    pub max_inhibition_density: Real,
    /// Minimum overlap for a column to take part in inhibition.
    pub stimulus_threshold: Real,
    /// Decrement of inactive proximal synapses.
    pub syn_perm_inactive_dec: Permanence,
    /// Increment of active proximal synapses.
    pub syn_perm_active_inc: Permanence,
    /// Connected threshold of proximal synapses.
    pub syn_perm_connected: Permanence,
    /// Increment applied to a whole pool when a column is under-connected.
    pub syn_perm_below_stimulus_inc: Permanence,
    /// Proximal permanences at or below this value are removed.
    pub syn_perm_trim_threshold: Permanence,
    /// Lower bound of proximal permanences.
    pub syn_perm_min: Permanence,
    /// Upper bound of proximal permanences.
    pub syn_perm_max: Permanence,
    /// Probability that an initial proximal synapse starts connected.
    pub init_connected_pct: Real,
    /// Minimum overlap duty cycle, as a fraction of the neighborhood maximum.
    pub min_pct_overlap_duty_cycles: Real,
    /// Period of the duty-cycle moving averages.
    pub duty_cycle_period: UInt,
    /// Ceiling of the boost factors. Values <= 1 disable boosting.
    pub max_boost: Real,
    /// Iterations between inhibition radius and minimum duty-cycle updates.
    pub update_period: UInt,
    /// Input neighborhoods wrap around the borders when true.
    pub wrap_around: bool,

    // Temporal memory
    /// Cells per column.
    pub cells_per_column: UInt,
    /// Active connected synapses needed for a segment to be active.
    pub activation_threshold: UInt,
    /// Active potential synapses needed for a segment to be matching.
    pub min_threshold: UInt,
    /// Maximum synapses grown on a segment per learning step.
    pub max_new_synapse_count: UInt,
    /// Maximum synapses on a distal segment.
    pub max_synapses_per_segment: UInt,
    /// Maximum distal segments on a cell.
    pub max_segments_per_cell: UInt,
    /// Permanence of newly grown distal synapses.
    pub initial_permanence: Permanence,
    /// Connected threshold of distal synapses.
    pub connected_permanence: Permanence,
    /// Increment of active distal synapses.
    pub permanence_increment: Permanence,
    /// Decrement of inactive distal synapses.
    pub permanence_decrement: Permanence,
    /// Decrement of matching segments in inactive columns.
    pub predicted_segment_decrement: Permanence,

    /// Seed of all random draws. A negative value selects a random seed.
    pub random_gen_seed: i64,
}

impl Default for HtmConfig {
    fn default() -> Self {
        Self {
            input_dimensions: vec![100],
            column_dimensions: vec![2048],
            is_column_major: false,

            potential_radius: 15,
            potential_pct: 0.75,
            global_inhibition: false,
            local_area_density: -1.0,
            num_active_columns_per_inh_area: 40.0,
            max_inhibition_density: 0.5,
            stimulus_threshold: 0.0,
            syn_perm_inactive_dec: 0.008,
            syn_perm_active_inc: 0.05,
            syn_perm_connected: 0.1,
            syn_perm_below_stimulus_inc: 0.01,
            syn_perm_trim_threshold: 0.05,
            syn_perm_min: 0.0,
            syn_perm_max: 1.0,
            init_connected_pct: 0.5,
            min_pct_overlap_duty_cycles: 0.001,
            duty_cycle_period: 1000,
            max_boost: 10.0,
            update_period: 50,
            wrap_around: true,

            cells_per_column: 32,
            activation_threshold: 13,
            min_threshold: 10,
            max_new_synapse_count: 20,
            max_synapses_per_segment: 255,
            max_segments_per_cell: 255,
            initial_permanence: 0.21,
            connected_permanence: 0.5,
            permanence_increment: 0.1,
            permanence_decrement: 0.1,
            predicted_segment_decrement: 0.0,

            random_gen_seed: 42,
        }
    }
}

fn invalid(name: &'static str, message: impl Into<String>) -> NeocortexError {
    NeocortexError::Configuration {
        name,
        message: message.into(),
    }
}

impl HtmConfig {
    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// `Configuration` naming the first invalid option.
    pub fn validate(&self) -> Result<()> {
        if self.input_dimensions.is_empty() || self.input_dimensions.contains(&0) {
            return Err(invalid("input_dimensions", "must be non-empty and non-zero"));
        }
        if self.column_dimensions.is_empty() || self.column_dimensions.contains(&0) {
            return Err(invalid("column_dimensions", "must be non-empty and non-zero"));
        }
        if self.input_dimensions.len() != self.column_dimensions.len() {
            return Err(invalid(
                "column_dimensions",
                format!(
                    "rank {} differs from input rank {}",
                    self.column_dimensions.len(),
                    self.input_dimensions.len()
                ),
            ));
        }

        if self.num_active_columns_per_inh_area <= 0.0
            && (self.local_area_density <= 0.0 || self.local_area_density > 0.5)
        {
            return Err(invalid(
                "local_area_density",
                "must be in (0, 0.5] when num_active_columns_per_inh_area is 0",
            ));
        }
        if self.potential_pct <= 0.0 || self.potential_pct > 1.0 {
            return Err(invalid("potential_pct", "must be in (0, 1]"));
        }
        if self.potential_radius < -1 {
            return Err(invalid("potential_radius", "must be -1 or non-negative"));
        }
        if self.duty_cycle_period == 0 {
            return Err(invalid("duty_cycle_period", "must be positive"));
        }
        if self.update_period == 0 {
            return Err(invalid("update_period", "must be positive"));
        }
        if self.cells_per_column == 0 {
            return Err(invalid("cells_per_column", "must be positive"));
        }
        if self.syn_perm_min >= self.syn_perm_max {
            return Err(invalid("syn_perm_min", "must be below syn_perm_max"));
        }

        let permanences = [
            ("syn_perm_inactive_dec", self.syn_perm_inactive_dec),
            ("syn_perm_active_inc", self.syn_perm_active_inc),
            ("syn_perm_connected", self.syn_perm_connected),
            ("syn_perm_below_stimulus_inc", self.syn_perm_below_stimulus_inc),
            ("syn_perm_trim_threshold", self.syn_perm_trim_threshold),
            ("syn_perm_min", self.syn_perm_min),
            ("syn_perm_max", self.syn_perm_max),
            ("initial_permanence", self.initial_permanence),
            ("connected_permanence", self.connected_permanence),
            ("permanence_increment", self.permanence_increment),
            ("permanence_decrement", self.permanence_decrement),
            ("predicted_segment_decrement", self.predicted_segment_decrement),
        ];
        for (name, value) in permanences {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(name, format!("{value} is outside [0, 1]")));
            }
        }
        Ok(())
    }

    /// Returns the number of input bits.
    pub fn num_inputs(&self) -> usize {
        self.input_dimensions.iter().map(|&d| d as usize).product()
    }

    /// Returns the number of columns.
    pub fn num_columns(&self) -> usize {
        self.column_dimensions.iter().map(|&d| d as usize).product()
    }

    /// Returns the number of cells.
    pub fn num_cells(&self) -> usize {
        self.num_columns() * self.cells_per_column as usize
    }

    /// Returns the topology of the input space.
    pub fn input_topology(&self) -> Result<ModuleTopology> {
        ModuleTopology::new(&self.input_dimensions, self.is_column_major)
    }

    /// Returns the topology of the column space.
    pub fn column_topology(&self) -> Result<ModuleTopology> {
        ModuleTopology::new(&self.column_dimensions, self.is_column_major)
    }
}
