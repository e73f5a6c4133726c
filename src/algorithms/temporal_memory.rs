//! Temporal Memory implementation.
//!
//! The Temporal Memory learns sequences of active columns. Each cycle it
//! decides which cells of the active columns fire, reinforces the distal
//! segments that predicted them, grows new segments where nothing did, and
//! predicts the cells of the next cycle.
//!
//! A cycle runs in two phases. Every column is planned independently against a
//! read-only [`Connections`], then the plans are applied serially. Planning
//! draws from a random stream keyed by iteration and column, so the serial and
//! parallel paths produce the same model.

use super::connections::SegmentKind;
use super::{Connections, SegmentActivity};
use crate::error::{NeocortexError, Result};
use crate::types::{CellIdx, ColumnIdx, Segment};
use crate::utils::Random;
use std::collections::BTreeMap;
use std::ops::Range;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Output of one temporal memory cycle. All lists are ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ComputeCycle {
    /// The validated active columns of this cycle.
    pub active_columns: Vec<ColumnIdx>,
    /// Cells active in this cycle.
    pub active_cells: Vec<CellIdx>,
    /// Cells chosen to learn in this cycle.
    pub winner_cells: Vec<CellIdx>,
    /// Cells predicted for the next cycle.
    pub predictive_cells: Vec<CellIdx>,
}

#[derive(Debug, Clone, Copy)]
enum Learning {
    Reinforce { segment: Segment, grow: usize },
    Punish { segment: Segment },
    NewSegment { cell: CellIdx, grow: usize },
}

#[derive(Debug, Default)]
struct ColumnPlan {
    column: ColumnIdx,
    bursting: bool,
    active_cells: Vec<CellIdx>,
    winner_cells: Vec<CellIdx>,
    learning: Vec<Learning>,
}

/// An active or punished column with its slices of the stored segment lists.
#[derive(Debug, Clone)]
struct ColumnGroup {
    column: ColumnIdx,
    is_active: bool,
    active_segments: Range<usize>,
    matching_segments: Range<usize>,
}

/// Read-only inputs shared by every column plan of a cycle.
struct CycleContext<'a> {
    mem: &'a Connections,
    seed: u64,
    iteration: u64,
    learn: bool,
    prev_winners: usize,
    active_segments: &'a [Segment],
    matching_segments: &'a [Segment],
    activity: &'a SegmentActivity,
}

impl CycleContext<'_> {
    fn plan(&self, group: &ColumnGroup) -> ColumnPlan {
        let active = &self.active_segments[group.active_segments.clone()];
        let matching = &self.matching_segments[group.matching_segments.clone()];
        if !group.is_active {
            return self.punish(group.column, matching);
        }
        if active.is_empty() {
            self.burst(group.column, matching)
        } else {
            self.activate_predicted(group.column, active)
        }
    }

    fn grow_for(&self, segment: Segment) -> usize {
        let max_new = self.mem.config().max_new_synapse_count as usize;
        max_new.saturating_sub(self.activity.potential_of(segment) as usize)
    }

    fn activate_predicted(&self, column: ColumnIdx, active: &[Segment]) -> ColumnPlan {
        let mut plan = ColumnPlan {
            column,
            ..Default::default()
        };
        for &segment in active {
            let cell = self.mem.cell_for_segment(segment);
            if plan.active_cells.last() != Some(&cell) {
                plan.active_cells.push(cell);
                plan.winner_cells.push(cell);
            }
            if self.learn {
                plan.learning.push(Learning::Reinforce {
                    segment,
                    grow: self.grow_for(segment),
                });
            }
        }
        plan
    }

    fn burst(&self, column: ColumnIdx, matching: &[Segment]) -> ColumnPlan {
        let mut plan = ColumnPlan {
            column,
            bursting: true,
            active_cells: self.mem.cells_for_column(column).collect(),
            ..Default::default()
        };

        // Highest potential count; the comparator order of `matching` keeps
        // the first of equals.
        let best = matching.iter().copied().fold(None, |best: Option<Segment>, s| match best {
            Some(b) if self.activity.potential_of(s) <= self.activity.potential_of(b) => Some(b),
            _ => Some(s),
        });

        if let Some(segment) = best {
            plan.winner_cells.push(self.mem.cell_for_segment(segment));
            if self.learn {
                plan.learning.push(Learning::Reinforce {
                    segment,
                    grow: self.grow_for(segment),
                });
            }
        } else {
            let cell = self.least_used_cell(column);
            plan.winner_cells.push(cell);
            if self.learn && self.prev_winners > 0 {
                let max_new = self.mem.config().max_new_synapse_count as usize;
                plan.learning.push(Learning::NewSegment {
                    cell,
                    grow: max_new.min(self.prev_winners),
                });
            }
        }
        plan
    }

    fn punish(&self, column: ColumnIdx, matching: &[Segment]) -> ColumnPlan {
        ColumnPlan {
            column,
            learning: matching
                .iter()
                .map(|&segment| Learning::Punish { segment })
                .collect(),
            ..Default::default()
        }
    }

    /// The cell with the fewest segments, ties broken at random.
    fn least_used_cell(&self, column: ColumnIdx) -> CellIdx {
        let cells = self.mem.cells_for_column(column);
        let fewest = cells
            .clone()
            .map(|c| self.mem.segments_for_cell(c).len())
            .min()
            .unwrap_or(0);
        let candidates: Vec<CellIdx> = cells
            .filter(|&c| self.mem.segments_for_cell(c).len() == fewest)
            .collect();

        let num_columns = self.mem.num_columns() as u64;
        let stream = self
            .iteration
            .wrapping_mul(num_columns)
            .wrapping_add(u64::from(column));
        let mut rng = Random::from_stream(self.seed, stream);
        candidates[rng.get_usize(candidates.len())]
    }
}

/// Maps each column owning one of `segments` to its contiguous slice.
/// `segments` must be in comparator order.
fn ranges_by_column(mem: &Connections, segments: &[Segment]) -> BTreeMap<ColumnIdx, Range<usize>> {
    let mut ranges: BTreeMap<ColumnIdx, Range<usize>> = BTreeMap::new();
    for (i, &segment) in segments.iter().enumerate() {
        let column = mem.column_for_cell(mem.cell_for_segment(segment));
        ranges
            .entry(column)
            .and_modify(|r| r.end = i + 1)
            .or_insert(i..i + 1);
    }
    ranges
}

/// The Temporal Memory algorithm.
///
/// # Example
///
/// ```rust
/// use neocortex::algorithms::{Connections, HtmConfig, TemporalMemory};
///
/// let mut mem = Connections::new(HtmConfig {
///     input_dimensions: vec![50],
///     column_dimensions: vec![50],
///     cells_per_column: 4,
///     ..Default::default()
/// })
/// .unwrap();
/// let mut tm = TemporalMemory::new(&mem);
///
/// let cycle = tm.compute(&mut mem, &[1, 5, 10], true).unwrap();
/// // Nothing was predicted, so every cell of the three columns bursts.
/// assert_eq!(cycle.active_cells.len(), 12);
/// assert_eq!(cycle.winner_cells.len(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TemporalMemory {
    seed: u64,
    iteration: u64,
}

impl TemporalMemory {
    /// Creates a temporal memory over the cells of `mem`.
    pub fn new(mem: &Connections) -> Self {
        Self {
            seed: Random::new(mem.config().random_gen_seed).seed(),
            iteration: 0,
        }
    }

    /// Returns the number of computed cycles.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Runs one cycle for the given active columns.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` when a column index is not below `num_columns`.
    pub fn compute(
        &mut self,
        mem: &mut Connections,
        active_columns: &[ColumnIdx],
        learn: bool,
    ) -> Result<ComputeCycle> {
        let columns = Self::validate(mem, active_columns)?;
        let plans = {
            let groups = Self::group(mem, &columns, learn);
            let ctx = self.context(mem, learn);
            groups.iter().map(|g| ctx.plan(g)).collect::<Vec<_>>()
        };
        self.finish(mem, columns, plans, learn)
    }

    /// Same as [`compute`](Self::compute), planning the columns in parallel.
    #[cfg(feature = "rayon")]
    pub fn compute_parallel(
        &mut self,
        mem: &mut Connections,
        active_columns: &[ColumnIdx],
        learn: bool,
    ) -> Result<ComputeCycle> {
        let columns = Self::validate(mem, active_columns)?;
        let plans = {
            let groups = Self::group(mem, &columns, learn);
            let ctx = self.context(mem, learn);
            groups.par_iter().map(|g| ctx.plan(g)).collect::<Vec<_>>()
        };
        self.finish(mem, columns, plans, learn)
    }

    /// Clears the active, winner, active-segment and matching-segment sets,
    /// so the next cycle starts a new sequence.
    pub fn reset(&mut self, mem: &mut Connections) {
        mem.active_cells.clear();
        mem.winner_cells.clear();
        mem.active_segments.clear();
        mem.matching_segments.clear();
        mem.last_activity = SegmentActivity::default();
    }

    fn validate(mem: &Connections, active_columns: &[ColumnIdx]) -> Result<Vec<ColumnIdx>> {
        let size = mem.num_columns();
        if let Some(&column) = active_columns.iter().find(|&&c| c as usize >= size) {
            return Err(NeocortexError::IndexOutOfBounds {
                index: column as usize,
                size,
            });
        }
        let mut columns = active_columns.to_vec();
        columns.sort_unstable();
        columns.dedup();
        Ok(columns)
    }

    fn context<'a>(&self, mem: &'a Connections, learn: bool) -> CycleContext<'a> {
        CycleContext {
            mem,
            seed: self.seed,
            iteration: self.iteration,
            learn,
            prev_winners: mem.winner_cells.len(),
            active_segments: &mem.active_segments,
            matching_segments: &mem.matching_segments,
            activity: &mem.last_activity,
        }
    }

    /// Joins the active columns with their active and matching segments.
    /// Inactive columns with matching segments are included for punishment
    /// when learning with a non-zero `predicted_segment_decrement`.
    fn group(mem: &Connections, columns: &[ColumnIdx], learn: bool) -> Vec<ColumnGroup> {
        let active = ranges_by_column(mem, &mem.active_segments);
        let matching = ranges_by_column(mem, &mem.matching_segments);
        let punish = learn && mem.config().predicted_segment_decrement > 0.0;

        let mut groups: Vec<ColumnGroup> = columns
            .iter()
            .map(|&column| ColumnGroup {
                column,
                is_active: true,
                active_segments: active.get(&column).cloned().unwrap_or(0..0),
                matching_segments: matching.get(&column).cloned().unwrap_or(0..0),
            })
            .collect();

        if punish {
            for (&column, range) in &matching {
                if columns.binary_search(&column).is_err() {
                    groups.push(ColumnGroup {
                        column,
                        is_active: false,
                        active_segments: 0..0,
                        matching_segments: range.clone(),
                    });
                }
            }
            groups.sort_by_key(|g| g.column);
        }
        groups
    }

    /// Applies the plans, then computes the segment activity for the next cycle.
    fn finish(
        &mut self,
        mem: &mut Connections,
        columns: Vec<ColumnIdx>,
        plans: Vec<ColumnPlan>,
        learn: bool,
    ) -> Result<ComputeCycle> {
        let prev_active = std::mem::take(&mut mem.active_cells);
        let prev_winners = std::mem::take(&mut mem.winner_cells);

        let mut active_cells = Vec::new();
        let mut winner_cells = Vec::new();
        let mut bursting = 0;
        for plan in &plans {
            active_cells.extend_from_slice(&plan.active_cells);
            winner_cells.extend_from_slice(&plan.winner_cells);
            bursting += usize::from(plan.bursting);
        }

        if learn {
            self.apply(mem, &plans, &prev_active, &prev_winners)?;
        }

        let config = mem.config();
        let activation_threshold = config.activation_threshold;
        let min_threshold = config.min_threshold;
        let activity = mem.compute_activity(&active_cells, config.connected_permanence);

        let distal: Vec<Segment> = (0..mem.segment_flat_list_length() as Segment)
            .filter(|&s| {
                mem.is_segment_alive(s) && mem.data_for_segment(s).kind == SegmentKind::Distal
            })
            .collect();
        let mut active_segments: Vec<Segment> = distal
            .iter()
            .copied()
            .filter(|&s| activity.active_of(s) >= activation_threshold)
            .collect();
        let mut matching_segments: Vec<Segment> = distal
            .into_iter()
            .filter(|&s| activity.potential_of(s) >= min_threshold)
            .collect();
        active_segments.sort_by(|&a, &b| mem.compare_segments(a, b));
        matching_segments.sort_by(|&a, &b| mem.compare_segments(a, b));

        let mut predictive_cells: Vec<CellIdx> = active_segments
            .iter()
            .map(|&s| mem.cell_for_segment(s))
            .collect();
        predictive_cells.dedup();

        if learn {
            for &segment in &active_segments {
                mem.record_segment_activity(segment);
            }
            mem.start_new_iteration();
        }

        log::debug!(
            "[TM] cycle {}: {} of {} columns bursting, {} predictive cells",
            self.iteration,
            bursting,
            columns.len(),
            predictive_cells.len()
        );

        mem.active_cells = active_cells.clone();
        mem.winner_cells = winner_cells.clone();
        mem.active_segments = active_segments;
        mem.matching_segments = matching_segments;
        mem.last_activity = activity;
        self.iteration += 1;

        Ok(ComputeCycle {
            active_columns: columns,
            active_cells,
            winner_cells,
            predictive_cells,
        })
    }

    /// Applies the learning of every plan. Existing segments are adapted
    /// before any segment is created, so no planned segment id is recycled
    /// while still referenced.
    fn apply(
        &self,
        mem: &mut Connections,
        plans: &[ColumnPlan],
        prev_active: &[CellIdx],
        prev_winners: &[CellIdx],
    ) -> Result<()> {
        let config = mem.config();
        let (inc, dec) = (config.permanence_increment, config.permanence_decrement);
        let punishment = config.predicted_segment_decrement;
        let initial = config.initial_permanence;

        let mut new_segments = Vec::new();
        for plan in plans {
            let mut rng = self.growth_rng(mem, plan.column);
            for &action in &plan.learning {
                match action {
                    Learning::Reinforce { segment, grow } => {
                        mem.adapt_segment(segment, prev_active, inc, dec)?;
                        if grow > 0 {
                            mem.grow_synapses(segment, prev_winners, grow, initial, &mut rng)?;
                        }
                    }
                    Learning::Punish { segment } => {
                        mem.adapt_segment(segment, prev_active, -punishment, 0.0)?;
                    }
                    Learning::NewSegment { cell, grow } => new_segments.push((plan.column, cell, grow)),
                }
            }
        }

        for (column, cell, grow) in new_segments {
            let mut rng = self.growth_rng(mem, column);
            let segment = mem.create_segment(cell)?;
            mem.grow_synapses(segment, prev_winners, grow, initial, &mut rng)?;
        }
        Ok(())
    }

    /// Stream for synapse growth, disjoint from the planning streams.
    fn growth_rng(&self, mem: &Connections, column: ColumnIdx) -> Random {
        let num_columns = mem.num_columns() as u64;
        let stream = self
            .iteration
            .wrapping_mul(num_columns)
            .wrapping_add(u64::from(column));
        Random::from_stream(self.seed.rotate_left(32) ^ 0x9e37_79b9_7f4a_7c15, stream)
    }
}
