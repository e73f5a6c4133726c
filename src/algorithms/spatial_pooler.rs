//! Spatial Pooler implementation.
//!
//! The Spatial Pooler turns a dense binary input into a sparse set of active
//! columns. When learning it adapts each column's proximal permanences toward
//! the inputs it won on, keeps duty cycles, boosts columns that stay quiet, and
//! periodically recomputes the inhibition radius.
//!
//! All learning state lives in [`Connections`]; the pooler itself only keeps
//! its seed, a cache of column neighborhoods and an optional
//! [`HomeostaticPlasticityController`].

use super::{Connections, HomeostaticPlasticityController, HtmConfig};
use crate::error::{NeocortexError, Result};
use crate::matrix::{ModuleTopology, SparseObjectMatrix};
use crate::types::{ColumnIdx, InputIdx, Permanence, Real, UInt, EPSILON};
use crate::utils::{to_dense, Random};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Initial state of one column, computed without touching shared state.
#[derive(Debug, Clone)]
struct ColumnInit {
    pool: Vec<InputIdx>,
    permanences: Vec<Permanence>,
    avg_span: Real,
}

/// Column neighborhoods for one inhibition radius.
#[derive(Debug, Clone)]
struct NeighborhoodCache {
    radius: u32,
    columns: SparseObjectMatrix<Vec<usize>>,
}

#[inline]
fn is_connected(config: &HtmConfig, permanence: Permanence) -> bool {
    permanence >= config.syn_perm_connected - EPSILON
}

/// Maps a column to the input bit at the center of its receptive field,
/// spreading columns uniformly over the input space.
fn map_column(column: usize, columns: &ModuleTopology, inputs: &ModuleTopology) -> Result<usize> {
    let coords = columns.coordinates_of(column)?;
    let input_coords: Vec<UInt> = coords
        .iter()
        .zip(columns.dimensions())
        .zip(inputs.dimensions())
        .map(|((&c, &col_dim), &in_dim)| {
            let ratio = Real::from(c) / Real::from(col_dim);
            let span = Real::from(in_dim) / Real::from(col_dim);
            let x = (Real::from(in_dim) * ratio + span * 0.5) as i64;
            x.clamp(0, i64::from(in_dim) - 1) as UInt
        })
        .collect();
    inputs.index_of(&input_coords)
}

/// Draws the potential pool of a column, ascending.
fn map_potential(
    config: &HtmConfig,
    inputs: &ModuleTopology,
    columns: &ModuleTopology,
    column: usize,
    rng: &mut Random,
) -> Result<Vec<InputIdx>> {
    if config.potential_radius < 0 {
        return Ok((0..inputs.num_elements() as InputIdx).collect());
    }

    let center = map_column(column, columns, inputs)?;
    let radius = config.potential_radius.unsigned_abs();
    let field = if config.wrap_around {
        inputs.wrapping_neighborhood(center, radius)?
    } else {
        inputs.neighborhood(center, radius)?
    };
    let num_potential = (field.len() as Real * config.potential_pct + 0.5) as usize;

    let mut pool: Vec<InputIdx> = rng
        .sample(field, num_potential)
        .into_iter()
        .map(|i| i as InputIdx)
        .collect();
    pool.sort_unstable();
    Ok(pool)
}

fn truncate5(p: Permanence) -> Permanence {
    (p * 100_000.0).trunc() / 100_000.0
}

fn init_permanences(config: &HtmConfig, pool: &[InputIdx], rng: &mut Random) -> Vec<Permanence> {
    let connected = config.syn_perm_connected;
    pool.iter()
        .map(|_| {
            let p = if rng.get_real64() <= config.init_connected_pct {
                truncate5(connected + (config.syn_perm_max - connected) * rng.get_real64())
            } else {
                truncate5(connected * rng.get_real64())
            };
            if p < config.syn_perm_trim_threshold {
                0.0
            } else {
                p
            }
        })
        .collect()
}

/// Raises a whole pool by `syn_perm_below_stimulus_inc` until enough of it is
/// connected to reach the stimulus threshold, or nothing can rise further.
fn raise_to_stimulus(config: &HtmConfig, permanences: &mut [Permanence]) {
    let (lo, hi) = (config.syn_perm_min, config.syn_perm_max);
    for p in permanences.iter_mut() {
        *p = p.clamp(lo, hi);
    }
    let target = (config.stimulus_threshold.max(0.0).ceil() as usize).min(permanences.len());
    let inc = config.syn_perm_below_stimulus_inc;
    if inc <= 0.0 {
        return;
    }

    loop {
        let connected = permanences
            .iter()
            .filter(|&&p| is_connected(config, p))
            .count();
        if connected >= target || permanences.iter().all(|&p| p >= hi) {
            return;
        }
        for p in permanences.iter_mut() {
            *p = (*p + inc).min(hi);
        }
    }
}

/// Raises (optionally), trims and clips a pool's permanences in place.
/// Trimmed entries are left at zero, which removes their synapse.
fn update_pool_permanences(config: &HtmConfig, permanences: &mut [Permanence], raise: bool) {
    if raise {
        raise_to_stimulus(config, permanences);
    }
    for p in permanences.iter_mut() {
        *p = if *p <= config.syn_perm_trim_threshold {
            0.0
        } else {
            p.clamp(config.syn_perm_min, config.syn_perm_max)
        };
    }
}

/// Mean over input dimensions of the extent covered by the connected inputs.
fn avg_connected_span(inputs: &ModuleTopology, connected: &[InputIdx]) -> Result<Real> {
    if connected.is_empty() {
        return Ok(0.0);
    }
    let rank = inputs.dimensions().len();
    let mut lo = vec![UInt::MAX; rank];
    let mut hi = vec![0; rank];
    for &input in connected {
        let coords = inputs.coordinates_of(input as usize)?;
        for (d, &c) in coords.iter().enumerate() {
            lo[d] = lo[d].min(c);
            hi[d] = hi[d].max(c);
        }
    }
    let total: Real = lo
        .iter()
        .zip(&hi)
        .map(|(&l, &h)| Real::from(h - l + 1))
        .sum();
    Ok(total / rank as Real)
}

fn max_column_dimension(config: &HtmConfig) -> u32 {
    config.column_dimensions.iter().copied().max().unwrap_or(1)
}

fn compute_inhibition_radius(config: &HtmConfig, avg_span: Real) -> u32 {
    if config.global_inhibition {
        return max_column_dimension(config);
    }
    let columns_per_input: Real = config
        .column_dimensions
        .iter()
        .zip(&config.input_dimensions)
        .map(|(&c, &i)| Real::from(c) / Real::from(i))
        .sum::<Real>()
        / config.column_dimensions.len() as Real;
    let diameter = avg_span * columns_per_input;
    let radius = ((diameter - 1.0) / 2.0).max(1.0);
    (radius + 0.5) as u32
}

fn plan_column(mem: &Connections, seed: u64, column: usize) -> Result<ColumnInit> {
    let config = mem.config();
    let mut rng = Random::from_stream(seed, column as u64);

    let pool = map_potential(
        config,
        mem.input_topology(),
        mem.column_topology(),
        column,
        &mut rng,
    )?;
    let mut permanences = init_permanences(config, &pool, &mut rng);
    update_pool_permanences(config, &mut permanences, true);

    let connected: Vec<InputIdx> = pool
        .iter()
        .zip(&permanences)
        .filter(|(_, &p)| p > 0.0 && is_connected(config, p))
        .map(|(&i, _)| i)
        .collect();
    let avg_span = avg_connected_span(mem.input_topology(), &connected)?;

    Ok(ColumnInit {
        pool,
        permanences,
        avg_span,
    })
}

/// The Spatial Pooler algorithm.
///
/// # Example
///
/// ```rust
/// use neocortex::algorithms::{Connections, HtmConfig, SpatialPooler};
///
/// let mut mem = Connections::new(HtmConfig {
///     input_dimensions: vec![100],
///     column_dimensions: vec![200],
///     global_inhibition: true,
///     num_active_columns_per_inh_area: 10.0,
///     ..Default::default()
/// })
/// .unwrap();
/// let mut sp = SpatialPooler::new(&mut mem).unwrap();
///
/// let mut input = vec![0u8; 100];
/// for i in [1, 5, 10, 20, 30, 40, 50, 60] {
///     input[i] = 1;
/// }
/// let active = sp.compute(&mut mem, &input, true).unwrap();
/// assert!(active.len() <= 10);
/// assert!(active.windows(2).all(|w| w[0] < w[1]));
/// ```
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpatialPooler {
    seed: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    neighborhoods: Option<NeighborhoodCache>,
    controller: Option<HomeostaticPlasticityController>,
}

impl SpatialPooler {
    /// Creates a spatial pooler and initializes every column of `mem`: potential
    /// pool, proximal permanences and, from the connected spans, the
    /// inhibition radius.
    pub fn new(mem: &mut Connections) -> Result<Self> {
        let seed = Random::new(mem.config().random_gen_seed).seed();
        let plans = (0..mem.num_columns())
            .map(|column| plan_column(mem, seed, column))
            .collect::<Result<Vec<_>>>()?;
        Self::from_plans(mem, seed, plans)
    }

    /// Same as [`new`](Self::new), planning the columns in parallel.
    ///
    /// Each column draws from its own random stream, so the result is
    /// identical to the serial initialization.
    #[cfg(feature = "rayon")]
    pub fn new_parallel(mem: &mut Connections) -> Result<Self> {
        let seed = Random::new(mem.config().random_gen_seed).seed();
        let shared: &Connections = mem;
        let plans = (0..shared.num_columns())
            .into_par_iter()
            .map(|column| plan_column(shared, seed, column))
            .collect::<Result<Vec<_>>>()?;
        Self::from_plans(mem, seed, plans)
    }

    fn from_plans(mem: &mut Connections, seed: u64, plans: Vec<ColumnInit>) -> Result<Self> {
        let num_columns = plans.len();
        let mut total_span = 0.0;
        for (column, plan) in plans.into_iter().enumerate() {
            let column = column as ColumnIdx;
            mem.set_potential_pool(column, plan.pool)?;
            mem.set_proximal_permanences(column, &plan.permanences)?;
            total_span += plan.avg_span;
        }

        let avg_span = total_span / num_columns.max(1) as Real;
        mem.inhibition_radius = compute_inhibition_radius(mem.config(), avg_span);

        log::debug!(
            "[SP] initialized {} columns, avg span {:.2}, inhibition radius {}",
            num_columns,
            avg_span,
            mem.inhibition_radius
        );

        Ok(Self {
            seed,
            neighborhoods: None,
            controller: None,
        })
    }

    /// Attaches a homeostatic plasticity controller, fed on every learning cycle.
    #[must_use]
    pub fn with_homeostatic_controller(mut self, controller: HomeostaticPlasticityController) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Returns the attached homeostatic plasticity controller.
    pub fn homeostatic_controller(&self) -> Option<&HomeostaticPlasticityController> {
        self.controller.as_ref()
    }

    /// Returns the attached homeostatic plasticity controller mutably.
    pub fn homeostatic_controller_mut(&mut self) -> Option<&mut HomeostaticPlasticityController> {
        self.controller.as_mut()
    }

    /// Returns the seed of the column random streams.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Computes the active columns for a dense 0/1 input, ascending.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when `input` is not `num_inputs` long.
    pub fn compute(
        &mut self,
        mem: &mut Connections,
        input: &[u8],
        learn: bool,
    ) -> Result<Vec<ColumnIdx>> {
        let num_inputs = mem.num_inputs();
        if input.len() != num_inputs {
            return Err(NeocortexError::DimensionMismatch {
                expected: num_inputs,
                actual: input.len(),
            });
        }

        mem.sp_iteration += 1;
        if learn {
            mem.sp_learn_iteration += 1;
        }

        let overlaps = mem
            .connected_matrix()
            .right_vec_sum_at_nz(input, mem.config().stimulus_threshold)?;
        let boosted: Vec<Real> = if learn {
            overlaps
                .iter()
                .zip(mem.boost_factors())
                .map(|(&o, &b)| Real::from(o) * b)
                .collect()
        } else {
            overlaps.iter().map(|&o| Real::from(o)).collect()
        };

        let active = self.inhibit_columns(mem, &overlaps, &boosted)?;
        mem.overlaps = overlaps;
        mem.boosted_overlaps = boosted;

        if learn {
            Self::adapt_synapses(mem, input, &active)?;
            Self::update_duty_cycles(mem, &active);
            Self::bump_up_weak_columns(mem)?;
            self.update_boost_factors(mem)?;

            if mem.sp_iteration % u64::from(mem.config().update_period) == 0 {
                Self::update_inhibition_radius(mem)?;
                self.update_min_duty_cycles(mem)?;
            }

            if let Some(controller) = self.controller.as_mut() {
                let output = to_dense(&active, mem.num_columns());
                controller.compute(mem.config_mut(), input, &output);
            }
        }

        log::trace!(
            "[SP] cycle {}: {} active columns (learn={})",
            mem.sp_iteration,
            active.len(),
            learn
        );
        Ok(active)
    }

    /// Same as [`compute`](Self::compute), returning a dense 0/1 vector of
    /// `num_columns` entries.
    pub fn compute_dense(
        &mut self,
        mem: &mut Connections,
        input: &[u8],
        learn: bool,
    ) -> Result<Vec<u8>> {
        let active = self.compute(mem, input, learn)?;
        Ok(to_dense(&active, mem.num_columns()))
    }

    // ========================================================================
    // Inhibition
    // ========================================================================

    fn uses_global_inhibition(mem: &Connections) -> bool {
        mem.config().global_inhibition || mem.inhibition_radius() > max_column_dimension(mem.config())
    }

    fn inhibition_density(mem: &Connections) -> Real {
        let config = mem.config();
        let density = if config.local_area_density > 0.0 {
            config.local_area_density
        } else {
            let diameter = Real::from(2 * mem.inhibition_radius() + 1);
            let area = diameter
                .powi(config.column_dimensions.len() as i32)
                .min(mem.num_columns() as Real);
            config.num_active_columns_per_inh_area / area
        };
        density.min(config.max_inhibition_density)
    }

    fn inhibit_columns(
        &mut self,
        mem: &Connections,
        overlaps: &[u32],
        boosted: &[Real],
    ) -> Result<Vec<ColumnIdx>> {
        let density = Self::inhibition_density(mem);
        if Self::uses_global_inhibition(mem) {
            Ok(inhibit_columns_global(overlaps, boosted, density))
        } else {
            self.inhibit_columns_local(mem, overlaps, boosted, density)
        }
    }

    fn inhibit_columns_local(
        &mut self,
        mem: &Connections,
        overlaps: &[u32],
        boosted: &[Real],
        density: Real,
    ) -> Result<Vec<ColumnIdx>> {
        let max_overlap = boosted.iter().copied().fold(0.0, Real::max);
        let winner_delta = if max_overlap > 0.0 {
            max_overlap / 1000.0
        } else {
            0.001
        };

        let mut tie_broken = boosted.to_vec();
        let mut winners = Vec::new();
        for column in 0..boosted.len() {
            if overlaps[column] == 0 {
                continue;
            }
            let neighborhood = self.neighborhood(mem, column)?;
            let overlap = boosted[column];
            let num_higher = neighborhood
                .iter()
                .filter(|&&n| tie_broken[n] > overlap)
                .count();
            let num_active = (0.5 + density * neighborhood.len() as Real) as usize;
            if num_higher < num_active {
                winners.push(column as ColumnIdx);
                tie_broken[column] += winner_delta;
            }
        }
        Ok(winners)
    }

    /// Returns the inhibition neighborhood of a column (center included),
    /// computing it on first use for the current radius.
    fn neighborhood(&mut self, mem: &Connections, column: usize) -> Result<&[usize]> {
        let radius = mem.inhibition_radius();
        if self
            .neighborhoods
            .as_ref()
            .map_or(true, |cache| cache.radius != radius)
        {
            self.neighborhoods = Some(NeighborhoodCache {
                radius,
                columns: SparseObjectMatrix::with_topology(mem.column_topology().clone()),
            });
        }
        let cache = self.neighborhoods.as_mut().ok_or_else(|| {
            NeocortexError::InternalError("neighborhood cache missing".to_string())
        })?;

        let topology = mem.column_topology();
        let wrap = mem.config().wrap_around;
        let neighborhood = cache.columns.get_or_try_insert_with(column, |c| {
            if wrap {
                topology.wrapping_neighborhood(c, radius)
            } else {
                topology.neighborhood(c, radius)
            }
        })?;
        Ok(neighborhood.as_slice())
    }

    // ========================================================================
    // Learning
    // ========================================================================

    fn adapt_synapses(mem: &mut Connections, input: &[u8], active: &[ColumnIdx]) -> Result<()> {
        let inc = mem.config().syn_perm_active_inc;
        let dec = mem.config().syn_perm_inactive_dec;
        for &column in active {
            let pool = mem.potential_pool(column)?.to_vec();
            let mut permanences = mem.pool_permanences(column)?;
            for (p, &i) in permanences.iter_mut().zip(&pool) {
                if input[i as usize] != 0 {
                    *p += inc;
                } else {
                    *p -= dec;
                }
            }
            update_pool_permanences(mem.config(), &mut permanences, true);
            mem.set_proximal_permanences(column, &permanences)?;
        }
        Ok(())
    }

    fn update_duty_cycles(mem: &mut Connections, active: &[ColumnIdx]) {
        let period = u64::from(mem.config().duty_cycle_period)
            .min(mem.sp_iteration)
            .max(1) as Real;

        let mut is_active = vec![false; mem.num_columns()];
        for &column in active {
            is_active[column as usize] = true;
        }

        for column in 0..mem.num_columns() {
            let overlapped = if mem.overlaps[column] > 0 { 1.0 } else { 0.0 };
            let fired = if is_active[column] { 1.0 } else { 0.0 };
            let d = &mut mem.overlap_duty_cycles[column];
            *d = (*d * (period - 1.0) + overlapped) / period;
            let d = &mut mem.active_duty_cycles[column];
            *d = (*d * (period - 1.0) + fired) / period;
        }
    }

    fn bump_up_weak_columns(mem: &mut Connections) -> Result<()> {
        let inc = mem.config().syn_perm_below_stimulus_inc;
        for column in 0..mem.num_columns() {
            if mem.overlap_duty_cycles[column] >= mem.min_overlap_duty_cycles[column] {
                continue;
            }
            let column = column as ColumnIdx;
            let mut permanences = mem.pool_permanences(column)?;
            for p in &mut permanences {
                *p += inc;
            }
            update_pool_permanences(mem.config(), &mut permanences, true);
            mem.set_proximal_permanences(column, &permanences)?;
        }
        Ok(())
    }

    /// Moves each boost factor toward `max_boost + (1 - max_boost) * own / avg`
    /// by `1 / duty_cycle_period` of the gap, where `avg` is the mean active
    /// duty cycle of the column's inhibition area. Columns at or above `avg`
    /// get 1. A `max_boost` of 1 or less disables boosting.
    fn update_boost_factors(&mut self, mem: &mut Connections) -> Result<()> {
        let max_boost = mem.config().max_boost;
        if max_boost <= 1.0 {
            mem.boost_factors.fill(1.0);
            return Ok(());
        }

        let num_columns = mem.num_columns();
        let averages: Vec<Real> = if Self::uses_global_inhibition(mem) {
            let mean = mem.active_duty_cycles.iter().sum::<Real>() / num_columns as Real;
            vec![mean; num_columns]
        } else {
            let mut averages = Vec::with_capacity(num_columns);
            for column in 0..num_columns {
                let neighborhood = self.neighborhood(mem, column)?;
                let sum: Real = neighborhood
                    .iter()
                    .map(|&n| mem.active_duty_cycles[n])
                    .sum();
                averages.push(sum / neighborhood.len().max(1) as Real);
            }
            averages
        };

        let period = Real::from(mem.config().duty_cycle_period);
        for (column, &avg) in averages.iter().enumerate() {
            let own = mem.active_duty_cycles[column];
            let boost = &mut mem.boost_factors[column];
            *boost = if avg <= 0.0 || own >= avg {
                1.0
            } else {
                let target = max_boost + (1.0 - max_boost) * own / avg;
                (*boost + (target - *boost) / period).clamp(1.0, max_boost)
            };
        }
        Ok(())
    }

    fn update_inhibition_radius(mem: &mut Connections) -> Result<()> {
        let radius = if mem.config().global_inhibition {
            max_column_dimension(mem.config())
        } else {
            let total = (0..mem.num_columns() as ColumnIdx)
                .map(|column| avg_connected_span(mem.input_topology(), &mem.connected_inputs(column)))
                .sum::<Result<Real>>()?;
            compute_inhibition_radius(mem.config(), total / mem.num_columns() as Real)
        };

        if radius != mem.inhibition_radius {
            log::debug!(
                "[SP] inhibition radius {} -> {}",
                mem.inhibition_radius,
                radius
            );
            mem.inhibition_radius = radius;
        }
        Ok(())
    }

    fn update_min_duty_cycles(&mut self, mem: &mut Connections) -> Result<()> {
        let pct = mem.config().min_pct_overlap_duty_cycles;
        if Self::uses_global_inhibition(mem) {
            let max = mem.overlap_duty_cycles.iter().copied().fold(0.0, Real::max);
            mem.min_overlap_duty_cycles.fill(pct * max);
            return Ok(());
        }

        for column in 0..mem.num_columns() {
            let max = {
                let neighborhood = self.neighborhood(mem, column)?;
                neighborhood
                    .iter()
                    .map(|&n| mem.overlap_duty_cycles[n])
                    .fold(0.0, Real::max)
            };
            mem.min_overlap_duty_cycles[column] = pct * max;
        }
        Ok(())
    }
}

/// Selects the strongest columns of the whole region.
///
/// Columns are ranked by boosted overlap, then raw overlap, then index; the
/// first `density * num_columns` with a non-zero overlap win. Ascending.
fn inhibit_columns_global(overlaps: &[u32], boosted: &[Real], density: Real) -> Vec<ColumnIdx> {
    let num_columns = boosted.len();
    let num_active = (density * num_columns as Real + 1e-9) as usize;

    let mut ranked: Vec<usize> = (0..num_columns).collect();
    ranked.sort_by(|&a, &b| {
        boosted[b]
            .total_cmp(&boosted[a])
            .then(overlaps[b].cmp(&overlaps[a]))
            .then(a.cmp(&b))
    });

    let mut winners: Vec<ColumnIdx> = ranked
        .into_iter()
        .take(num_active)
        .filter(|&c| overlaps[c] > 0)
        .map(|c| c as ColumnIdx)
        .collect();
    winners.sort_unstable();
    winners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::HtmConfig;

    fn global_config() -> HtmConfig {
        HtmConfig {
            input_dimensions: vec![100],
            column_dimensions: vec![200],
            potential_radius: 50,
            potential_pct: 0.5,
            global_inhibition: true,
            num_active_columns_per_inh_area: 10.0,
            ..Default::default()
        }
    }

    fn dense(bits: &[usize], len: usize) -> Vec<u8> {
        let mut v = vec![0u8; len];
        for &b in bits {
            v[b] = 1;
        }
        v
    }

    #[test]
    fn test_map_column_spreads_uniformly() {
        let columns = ModuleTopology::new(&[3], false).unwrap();
        let inputs = ModuleTopology::new(&[7], false).unwrap();
        assert_eq!(map_column(0, &columns, &inputs).unwrap(), 1);
        assert_eq!(map_column(1, &columns, &inputs).unwrap(), 3);
        assert_eq!(map_column(2, &columns, &inputs).unwrap(), 5);
    }

    #[test]
    fn test_potential_pool_size() {
        let config = HtmConfig {
            input_dimensions: vec![100],
            column_dimensions: vec![100],
            potential_radius: 5,
            potential_pct: 0.5,
            ..Default::default()
        };
        let inputs = config.input_topology().unwrap();
        let columns = config.column_topology().unwrap();
        let mut rng = Random::new(1);
        // 11 inputs in the field, int(5.5 + 0.5) of them drawn.
        let pool = map_potential(&config, &inputs, &columns, 0, &mut rng).unwrap();
        assert_eq!(pool.len(), 6);
        assert!(pool.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_whole_input_pool() {
        let mut mem = Connections::new(HtmConfig {
            potential_radius: -1,
            ..global_config()
        })
        .unwrap();
        SpatialPooler::new(&mut mem).unwrap();
        for column in 0..200 {
            assert_eq!(mem.potential_pool(column).unwrap().len(), 100);
        }
    }

    #[test]
    fn test_initial_permanences_in_bounds() {
        let config = global_config();
        let mut mem = Connections::new(config.clone()).unwrap();
        SpatialPooler::new(&mut mem).unwrap();
        for column in 0..200 {
            let pool = mem.potential_pool(column).unwrap().len();
            let perms = mem.pool_permanences(column).unwrap();
            assert_eq!(perms.len(), pool);
            for p in perms {
                assert!(p == 0.0 || (p > config.syn_perm_trim_threshold && p <= config.syn_perm_max));
            }
        }
    }

    #[test]
    fn test_raise_to_stimulus() {
        let config = HtmConfig {
            stimulus_threshold: 3.0,
            ..Default::default()
        };
        let mut perms = vec![0.02, 0.05, 0.09, 0.0];
        raise_to_stimulus(&config, &mut perms);
        let connected = perms.iter().filter(|&&p| is_connected(&config, p)).count();
        assert!(connected >= 3);

        // A pool smaller than the threshold stops once fully connected.
        let mut small = vec![0.0];
        raise_to_stimulus(&config, &mut small);
        assert!(is_connected(&config, small[0]));
    }

    #[test]
    fn test_inhibition_radius_formula() {
        let config = HtmConfig {
            input_dimensions: vec![100],
            column_dimensions: vec![200],
            ..Default::default()
        };
        // diameter = 10 * 2 = 20, radius = 9.5 -> 10
        assert_eq!(compute_inhibition_radius(&config, 10.0), 10);
        assert_eq!(compute_inhibition_radius(&config, 0.0), 1);

        let global = HtmConfig {
            global_inhibition: true,
            ..config
        };
        assert_eq!(compute_inhibition_radius(&global, 10.0), 200);
    }

    #[test]
    fn test_global_inhibition_tie_break() {
        let overlaps = [3, 5, 5, 0, 4, 5];
        let boosted = [3.0, 5.0, 5.0, 0.0, 4.0, 5.0];
        // Two winners among three tied at 5: lowest indices first.
        assert_eq!(inhibit_columns_global(&overlaps, &boosted, 2.0 / 6.0), vec![1, 2]);

        // Boost outranks raw overlap; raw overlap breaks boost ties.
        let boosted = [9.0, 5.0, 5.0, 0.0, 4.0, 5.0];
        let overlaps = [3, 4, 6, 0, 4, 5];
        assert_eq!(inhibit_columns_global(&overlaps, &boosted, 2.0 / 6.0), vec![0, 2]);

        // Zero-overlap columns never win.
        assert_eq!(inhibit_columns_global(&[0, 0, 1], &[0.0, 0.0, 1.0], 1.0), vec![2]);
    }

    #[test]
    fn test_compute_rejects_wrong_length() {
        let mut mem = Connections::new(global_config()).unwrap();
        let mut sp = SpatialPooler::new(&mut mem).unwrap();
        assert!(matches!(
            sp.compute(&mut mem, &[1, 0, 1], true),
            Err(NeocortexError::DimensionMismatch {
                expected: 100,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_compute_sparsity() {
        let mut mem = Connections::new(global_config()).unwrap();
        let mut sp = SpatialPooler::new(&mut mem).unwrap();
        let input = dense(&(0..100).step_by(4).collect::<Vec<_>>(), 100);

        let active = sp.compute(&mut mem, &input, false).unwrap();
        assert_eq!(active.len(), 10);
        assert!(active.windows(2).all(|w| w[0] < w[1]));

        let dense_out = sp.compute_dense(&mut mem, &input, false).unwrap();
        assert_eq!(crate::utils::to_sparse(&dense_out), active);
    }

    #[test]
    fn test_local_inhibition() {
        let mut mem = Connections::new(HtmConfig {
            input_dimensions: vec![64],
            column_dimensions: vec![64],
            potential_radius: 8,
            global_inhibition: false,
            local_area_density: 0.1,
            ..Default::default()
        })
        .unwrap();
        let mut sp = SpatialPooler::new(&mut mem).unwrap();
        assert!(mem.inhibition_radius() >= 1);

        let input = dense(&(0..64).step_by(2).collect::<Vec<_>>(), 64);
        let active = sp.compute(&mut mem, &input, true).unwrap();
        assert!(!active.is_empty());
        assert!(active.len() < 64);
        assert!(active.iter().all(|&c| mem.overlaps()[c as usize] > 0));
    }

    #[test]
    fn test_learning_moves_permanences_toward_input() {
        let mut mem = Connections::new(global_config()).unwrap();
        let mut sp = SpatialPooler::new(&mut mem).unwrap();
        let input = dense(&(20..40).collect::<Vec<_>>(), 100);

        // Boost factors start at 1, so inference picks the same winners.
        let winners = sp.compute(&mut mem, &input, false).unwrap();
        let column = winners[0];
        let pool = mem.potential_pool(column).unwrap().to_vec();
        let before = mem.pool_permanences(column).unwrap();

        let learned = sp.compute(&mut mem, &input, true).unwrap();
        assert_eq!(learned, winners);
        let after = mem.pool_permanences(column).unwrap();
        let config = mem.config();

        for ((&i, &b), &a) in pool.iter().zip(&before).zip(&after) {
            assert!(a == 0.0 || (a >= config.syn_perm_min && a <= config.syn_perm_max));
            if (20..40).contains(&i) && b > 0.0 && a < config.syn_perm_max {
                assert!(a > b, "active input {i} did not strengthen");
            }
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let input = dense(&[3, 9, 14, 27, 33, 48, 51, 62, 70, 88], 100);
        let run = || {
            let mut mem = Connections::new(global_config()).unwrap();
            let mut sp = SpatialPooler::new(&mut mem).unwrap();
            (0..20)
                .map(|_| sp.compute(&mut mem, &input, true).unwrap())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[cfg(feature = "rayon")]
    #[test]
    fn test_parallel_init_matches_serial() {
        let mut serial = Connections::new(global_config()).unwrap();
        let mut parallel = Connections::new(global_config()).unwrap();
        SpatialPooler::new(&mut serial).unwrap();
        SpatialPooler::new_parallel(&mut parallel).unwrap();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_boost_strictly_increases_for_silent_column() {
        let mut mem = Connections::new(global_config()).unwrap();
        let mut sp = SpatialPooler::new(&mut mem).unwrap();
        mem.active_duty_cycles.fill(0.1);
        mem.active_duty_cycles[0] = 0.0;

        let max_boost = mem.config().max_boost;
        let mut previous = mem.boost_factors()[0];
        for _ in 0..50 {
            sp.update_boost_factors(&mut mem).unwrap();
            let boost = mem.boost_factors()[0];
            assert!(boost > previous);
            assert!(boost <= max_boost);
            previous = boost;
        }
        // Columns at or above the average are not boosted.
        assert!((mem.boost_factors()[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_boost_disabled_at_max_boost_one() {
        let mut mem = Connections::new(HtmConfig {
            max_boost: 1.0,
            ..global_config()
        })
        .unwrap();
        let mut sp = SpatialPooler::new(&mut mem).unwrap();
        mem.active_duty_cycles[0] = 0.0;
        mem.active_duty_cycles[1] = 0.5;
        sp.update_boost_factors(&mut mem).unwrap();
        assert!(mem.boost_factors().iter().all(|&b| (b - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_duty_cycles_use_short_period_early() {
        let mut mem = Connections::new(global_config()).unwrap();
        let mut sp = SpatialPooler::new(&mut mem).unwrap();
        let input = dense(&(0..50).collect::<Vec<_>>(), 100);
        let active = sp.compute(&mut mem, &input, true).unwrap();
        // After one cycle the period is 1, so the duty cycle is the last value.
        for &c in &active {
            assert!((mem.active_duty_cycles()[c as usize] - 1.0).abs() < 1e-12);
        }
    }
}
