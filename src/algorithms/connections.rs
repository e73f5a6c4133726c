//! Connections - the column, cell, segment and synapse graph.
//!
//! `Connections` is the single source of truth shared by the spatial pooler and
//! the temporal memory. Every entity is addressed by a stable integer id into an
//! arena owned here; back-references (synapse to segment, segment to owner) are
//! plain ids as well.
//!
//! Each column owns one proximal segment whose synapses connect to input bits.
//! Each cell owns any number of distal segments whose synapses connect to other
//! cells. Destroyed segment and synapse slots are recycled through free lists.

use super::HtmConfig;
use crate::error::{NeocortexError, Result};
use crate::matrix::{ModuleTopology, SparseBinaryMatrix};
use crate::types::{
    CellIdx, ColumnIdx, InputIdx, Permanence, Real, Segment, Synapse, SynapseIdx, EPSILON,
    MAX_PERMANENCE, MIN_PERMANENCE,
};
use crate::utils::Random;

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[inline]
fn is_connected(permanence: Permanence, threshold: Permanence) -> bool {
    permanence >= threshold - EPSILON
}

/// A column of the spatial pooler.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Column {
    /// Flat index of the column.
    pub index: ColumnIdx,
    /// The proximal segment connecting the column to its inputs.
    pub proximal_segment: Segment,
    /// Input bits the column may ever connect to, ascending.
    pub potential_pool: Vec<InputIdx>,
}

/// A cell of the temporal memory.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cell {
    /// Column owning the cell.
    pub column: ColumnIdx,
    /// Position of the cell within its column.
    pub index_in_column: u32,
    /// Distal segments of the cell, in creation order.
    pub segments: SmallVec<[Segment; 8]>,
}

/// Dendrite type of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SegmentKind {
    /// Column to input bits.
    Proximal,
    /// Cell to other cells.
    Distal,
}

/// Data associated with a segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentData {
    /// Owning column (proximal) or cell (distal).
    pub owner: u32,
    /// Dendrite type.
    pub kind: SegmentKind,
    /// Creation order, unique over the lifetime of the model.
    pub ordinal: u64,
    /// The synapses on this segment.
    pub synapses: SmallVec<[Synapse; 32]>,
    /// Number of connected synapses.
    pub num_connected: SynapseIdx,
    /// Iteration at which the segment was last active.
    pub last_used_iteration: u64,
    alive: bool,
}

/// Data associated with a synapse.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SynapseData {
    /// Presynaptic cell (distal) or input bit (proximal).
    pub source: u32,
    /// The permanence strength of this synapse.
    pub permanence: Permanence,
    /// The segment this synapse belongs to.
    pub segment: Segment,
    alive: bool,
}

/// Per-segment activity counts, indexed by segment id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SegmentActivity {
    /// Synapses from active cells with a connected permanence.
    pub active: Vec<u32>,
    /// Synapses from active cells, whatever the permanence.
    pub potential: Vec<u32>,
}

impl SegmentActivity {
    /// Returns the active count of a segment.
    #[inline]
    pub fn active_of(&self, segment: Segment) -> u32 {
        self.active.get(segment as usize).copied().unwrap_or(0)
    }

    /// Returns the potential count of a segment.
    #[inline]
    pub fn potential_of(&self, segment: Segment) -> u32 {
        self.potential.get(segment as usize).copied().unwrap_or(0)
    }
}

/// Summary of the graph and its permanences.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HtmStatistics {
    /// Live segments, proximal included.
    pub num_segments: usize,
    /// Live distal segments.
    pub num_distal_segments: usize,
    /// Live synapses.
    pub num_synapses: usize,
    /// Live synapses above their connected threshold.
    pub num_connected_synapses: usize,
    /// Smallest permanence, 0 without synapses.
    pub min_permanence: Permanence,
    /// Largest permanence, 0 without synapses.
    pub max_permanence: Permanence,
    /// Mean permanence, 0 without synapses.
    pub avg_permanence: Permanence,
    /// Mean synapse count of the distal segments.
    pub avg_synapses_per_distal_segment: Real,
}

/// The connectivity graph and the bookkeeping of both engines.
///
/// # Example
///
/// ```rust
/// use neocortex::algorithms::{Connections, HtmConfig};
///
/// let mut mem = Connections::new(HtmConfig {
///     column_dimensions: vec![16],
///     input_dimensions: vec![16],
///     cells_per_column: 4,
///     ..Default::default()
/// })
/// .unwrap();
///
/// let segment = mem.create_segment(5).unwrap();
/// mem.create_synapse(segment, 42, 0.6).unwrap();
/// mem.create_synapse(segment, 43, 0.2).unwrap();
///
/// let activity = mem.compute_activity(&[42, 43], 0.5);
/// assert_eq!(activity.active_of(segment), 1);
/// assert_eq!(activity.potential_of(segment), 2);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "ConnectionsState", into = "ConnectionsState")
)]
pub struct Connections {
    config: HtmConfig,
    input_topology: ModuleTopology,
    column_topology: ModuleTopology,

    columns: Vec<Column>,
    cells: Vec<Cell>,

    segments: Vec<SegmentData>,
    free_segments: Vec<Segment>,
    synapses: Vec<SynapseData>,
    free_synapses: Vec<Synapse>,
    next_ordinal: u64,
    iteration: u64,

    /// Presynaptic cell -> distal synapses.
    receptors: AHashMap<CellIdx, Vec<Synapse>>,
    /// Column x input bits with a connected proximal synapse.
    connected_inputs: SparseBinaryMatrix,

    // Spatial pooler state
    pub(crate) boost_factors: Vec<Real>,
    pub(crate) overlap_duty_cycles: Vec<Real>,
    pub(crate) active_duty_cycles: Vec<Real>,
    pub(crate) min_overlap_duty_cycles: Vec<Real>,
    pub(crate) overlaps: Vec<u32>,
    pub(crate) boosted_overlaps: Vec<Real>,
    pub(crate) inhibition_radius: u32,
    pub(crate) sp_iteration: u64,
    pub(crate) sp_learn_iteration: u64,

    // Temporal memory state
    pub(crate) active_cells: Vec<CellIdx>,
    pub(crate) winner_cells: Vec<CellIdx>,
    pub(crate) active_segments: Vec<Segment>,
    pub(crate) matching_segments: Vec<Segment>,
    pub(crate) last_activity: SegmentActivity,
}

impl Connections {
    /// Creates the graph for a configuration: every column with an empty
    /// potential pool and its proximal segment, every cell without segments.
    ///
    /// # Errors
    ///
    /// `Configuration` when the configuration does not validate.
    pub fn new(config: HtmConfig) -> Result<Self> {
        config.validate()?;

        let input_topology = config.input_topology()?;
        let column_topology = config.column_topology()?;
        let num_columns = config.num_columns();
        let num_inputs = config.num_inputs();
        let cells_per_column = config.cells_per_column;

        let connected_inputs =
            SparseBinaryMatrix::new(&[num_columns as u32, num_inputs as u32], false)?;

        let mut mem = Self {
            config,
            input_topology,
            column_topology,
            columns: Vec::with_capacity(num_columns),
            cells: Vec::with_capacity(num_columns * cells_per_column as usize),
            segments: Vec::with_capacity(num_columns),
            free_segments: Vec::new(),
            synapses: Vec::new(),
            free_synapses: Vec::new(),
            next_ordinal: 0,
            iteration: 0,
            receptors: AHashMap::new(),
            connected_inputs,
            boost_factors: vec![1.0; num_columns],
            overlap_duty_cycles: vec![0.0; num_columns],
            active_duty_cycles: vec![0.0; num_columns],
            min_overlap_duty_cycles: vec![0.0; num_columns],
            overlaps: vec![0; num_columns],
            boosted_overlaps: vec![0.0; num_columns],
            inhibition_radius: 0,
            sp_iteration: 0,
            sp_learn_iteration: 0,
            active_cells: Vec::new(),
            winner_cells: Vec::new(),
            active_segments: Vec::new(),
            matching_segments: Vec::new(),
            last_activity: SegmentActivity::default(),
        };

        for column in 0..num_columns as ColumnIdx {
            let proximal_segment = mem.allocate_segment(column, SegmentKind::Proximal);
            mem.columns.push(Column {
                index: column,
                proximal_segment,
                potential_pool: Vec::new(),
            });
            for index_in_column in 0..cells_per_column {
                mem.cells.push(Cell {
                    column,
                    index_in_column,
                    segments: SmallVec::new(),
                });
            }
        }

        log::debug!(
            "[CONN] created {} columns x {} cells over {} inputs",
            num_columns,
            cells_per_column,
            num_inputs
        );
        Ok(mem)
    }

    // ========================================================================
    // Configuration and topology
    // ========================================================================

    /// Returns the configuration.
    #[inline]
    pub fn config(&self) -> &HtmConfig {
        &self.config
    }

    /// Returns the configuration for in-place tuning.
    ///
    /// Only scalar learning parameters may be changed; the dimensions were
    /// fixed when the graph was built.
    #[inline]
    pub fn config_mut(&mut self) -> &mut HtmConfig {
        &mut self.config
    }

    /// Returns the topology of the input space.
    #[inline]
    pub fn input_topology(&self) -> &ModuleTopology {
        &self.input_topology
    }

    /// Returns the topology of the column space.
    #[inline]
    pub fn column_topology(&self) -> &ModuleTopology {
        &self.column_topology
    }

    /// Returns the number of columns.
    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Returns the number of cells.
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns the number of input bits.
    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.input_topology.num_elements()
    }

    /// Returns a column.
    pub fn column(&self, column: ColumnIdx) -> Option<&Column> {
        self.columns.get(column as usize)
    }

    /// Returns a cell.
    pub fn cell(&self, cell: CellIdx) -> Option<&Cell> {
        self.cells.get(cell as usize)
    }

    /// Returns the cells of a column.
    #[inline]
    pub fn cells_for_column(&self, column: ColumnIdx) -> Range<CellIdx> {
        let cpc = self.config.cells_per_column;
        column * cpc..(column + 1) * cpc
    }

    /// Returns the column of a cell.
    #[inline]
    pub fn column_for_cell(&self, cell: CellIdx) -> ColumnIdx {
        cell / self.config.cells_per_column
    }

    /// Returns the current iteration of the segment age clock.
    #[inline]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    // ========================================================================
    // Segment operations
    // ========================================================================

    fn allocate_segment(&mut self, owner: u32, kind: SegmentKind) -> Segment {
        let data = SegmentData {
            owner,
            kind,
            ordinal: self.next_ordinal,
            synapses: SmallVec::new(),
            num_connected: 0,
            last_used_iteration: self.iteration,
            alive: true,
        };
        self.next_ordinal += 1;

        if let Some(reuse) = self.free_segments.pop() {
            self.segments[reuse as usize] = data;
            reuse
        } else {
            let segment = self.segments.len() as Segment;
            self.segments.push(data);
            segment
        }
    }

    /// Creates a new distal segment on a cell.
    ///
    /// When the cell already holds `max_segments_per_cell` segments, the least
    /// recently used one is destroyed first.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` for an unknown cell.
    pub fn create_segment(&mut self, cell: CellIdx) -> Result<Segment> {
        let num_cells = self.cells.len();
        if cell as usize >= num_cells {
            return Err(NeocortexError::IndexOutOfBounds {
                index: cell as usize,
                size: num_cells,
            });
        }

        let max = self.config.max_segments_per_cell as usize;
        while max > 0 && self.cells[cell as usize].segments.len() >= max {
            let Some(lru) = self.least_recently_used_segment(cell) else {
                break;
            };
            log::trace!("[CONN] cell {} at capacity, evicting segment {}", cell, lru);
            self.destroy_segment(lru)?;
        }

        let segment = self.allocate_segment(cell, SegmentKind::Distal);
        self.cells[cell as usize].segments.push(segment);
        Ok(segment)
    }

    fn least_recently_used_segment(&self, cell: CellIdx) -> Option<Segment> {
        self.cells[cell as usize]
            .segments
            .iter()
            .copied()
            .min_by_key(|&s| {
                let data = &self.segments[s as usize];
                (data.last_used_iteration, data.ordinal)
            })
    }

    /// Destroys a distal segment and all its synapses.
    ///
    /// The segment is detached from its cell before its slot is recycled.
    /// Proximal segments belong to their column for the life of the model and
    /// are left untouched, as are already destroyed segments.
    pub fn destroy_segment(&mut self, segment: Segment) -> Result<()> {
        let Some(data) = self.segments.get(segment as usize) else {
            return Ok(());
        };
        if !data.alive || data.kind == SegmentKind::Proximal {
            return Ok(());
        }
        let cell = data.owner;

        let synapses: SmallVec<[Synapse; 32]> = data.synapses.clone();
        for synapse in synapses {
            self.destroy_synapse(synapse)?;
        }

        let cell_segments = &mut self.cells[cell as usize].segments;
        if let Some(pos) = cell_segments.iter().position(|&s| s == segment) {
            cell_segments.remove(pos);
        }

        let data = &mut self.segments[segment as usize];
        data.alive = false;
        data.num_connected = 0;
        self.free_segments.push(segment);
        Ok(())
    }

    /// Returns true when `segment` names a live segment.
    #[inline]
    pub fn is_segment_alive(&self, segment: Segment) -> bool {
        self.segments
            .get(segment as usize)
            .is_some_and(|data| data.alive)
    }

    /// Number of live segments, proximal included.
    pub fn num_segments(&self) -> usize {
        self.segments.len() - self.free_segments.len()
    }

    /// Number of live distal segments.
    pub fn num_distal_segments(&self) -> usize {
        self.num_segments() - self.columns.len()
    }

    /// Length of the segment arena; activity vectors are this long.
    #[inline]
    pub fn segment_flat_list_length(&self) -> usize {
        self.segments.len()
    }

    /// Gets the distal segments of a cell.
    #[inline]
    pub fn segments_for_cell(&self, cell: CellIdx) -> &[Segment] {
        &self.cells[cell as usize].segments
    }

    /// Gets the cell that owns a distal segment.
    #[inline]
    pub fn cell_for_segment(&self, segment: Segment) -> CellIdx {
        self.segments[segment as usize].owner
    }

    /// Gets the segment data.
    #[inline]
    pub fn data_for_segment(&self, segment: Segment) -> &SegmentData {
        &self.segments[segment as usize]
    }

    /// Stamps a segment as used in the current iteration.
    pub fn record_segment_activity(&mut self, segment: Segment) {
        if let Some(data) = self.segments.get_mut(segment as usize) {
            data.last_used_iteration = self.iteration;
        }
    }

    /// Advances the segment age clock.
    pub fn start_new_iteration(&mut self) {
        self.iteration += 1;
    }

    /// Deterministic segment order: owning cell, then creation ordinal.
    pub fn compare_segments(&self, a: Segment, b: Segment) -> Ordering {
        let a = &self.segments[a as usize];
        let b = &self.segments[b as usize];
        a.owner.cmp(&b.owner).then_with(|| a.ordinal.cmp(&b.ordinal))
    }

    // ========================================================================
    // Synapse operations
    // ========================================================================

    fn threshold_for(&self, kind: SegmentKind) -> Permanence {
        match kind {
            SegmentKind::Proximal => self.config.syn_perm_connected,
            SegmentKind::Distal => self.config.connected_permanence,
        }
    }

    fn bounds_for(&self, kind: SegmentKind) -> (Permanence, Permanence) {
        match kind {
            SegmentKind::Proximal => (self.config.syn_perm_min, self.config.syn_perm_max),
            SegmentKind::Distal => (MIN_PERMANENCE, MAX_PERMANENCE),
        }
    }

    fn set_connected_input(&mut self, column: u32, input: u32, value: bool) -> Result<()> {
        let index = column as usize * self.num_inputs() + input as usize;
        self.connected_inputs.set_bit(index, value)
    }

    /// Creates a synapse from `source` onto `segment`.
    ///
    /// The source is an input bit for proximal segments and a cell for distal
    /// ones. When the segment already has a synapse from `source`, that
    /// synapse is returned, its permanence raised if the new value is higher.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` for a dead segment or an out-of-range source.
    pub fn create_synapse(
        &mut self,
        segment: Segment,
        source: u32,
        permanence: Permanence,
    ) -> Result<Synapse> {
        if !self.is_segment_alive(segment) {
            return Err(NeocortexError::IndexOutOfBounds {
                index: segment as usize,
                size: self.segments.len(),
            });
        }
        let kind = self.segments[segment as usize].kind;
        let source_count = match kind {
            SegmentKind::Proximal => self.num_inputs(),
            SegmentKind::Distal => self.cells.len(),
        };
        if source as usize >= source_count {
            return Err(NeocortexError::IndexOutOfBounds {
                index: source as usize,
                size: source_count,
            });
        }

        let existing = self.segments[segment as usize]
            .synapses
            .iter()
            .copied()
            .find(|&s| self.synapses[s as usize].source == source);
        if let Some(existing) = existing {
            if permanence > self.synapses[existing as usize].permanence {
                self.update_synapse_permanence(existing, permanence)?;
            }
            return Ok(existing);
        }

        let (lo, hi) = self.bounds_for(kind);
        let permanence = permanence.clamp(lo, hi);
        let data = SynapseData {
            source,
            permanence,
            segment,
            alive: true,
        };
        let synapse = if let Some(reuse) = self.free_synapses.pop() {
            self.synapses[reuse as usize] = data;
            reuse
        } else {
            let synapse = self.synapses.len() as Synapse;
            self.synapses.push(data);
            synapse
        };

        self.segments[segment as usize].synapses.push(synapse);
        let connected = is_connected(permanence, self.threshold_for(kind));
        if connected {
            self.segments[segment as usize].num_connected += 1;
        }

        match kind {
            SegmentKind::Distal => self.receptors.entry(source).or_default().push(synapse),
            SegmentKind::Proximal if connected => {
                let column = self.segments[segment as usize].owner;
                self.set_connected_input(column, source, true)?;
            }
            SegmentKind::Proximal => {}
        }
        Ok(synapse)
    }

    /// Destroys a synapse. Destroyed synapses are ignored.
    pub fn destroy_synapse(&mut self, synapse: Synapse) -> Result<()> {
        let Some(data) = self.synapses.get(synapse as usize) else {
            return Ok(());
        };
        if !data.alive {
            return Ok(());
        }
        let segment = data.segment;
        let source = data.source;
        let kind = self.segments[segment as usize].kind;
        let was_connected = is_connected(data.permanence, self.threshold_for(kind));

        let segment_data = &mut self.segments[segment as usize];
        if let Some(pos) = segment_data.synapses.iter().position(|&s| s == synapse) {
            segment_data.synapses.remove(pos);
        }
        if was_connected {
            segment_data.num_connected = segment_data.num_connected.saturating_sub(1);
        }
        let owner = segment_data.owner;

        match kind {
            SegmentKind::Distal => {
                if let Some(list) = self.receptors.get_mut(&source) {
                    if let Some(pos) = list.iter().position(|&s| s == synapse) {
                        list.swap_remove(pos);
                    }
                    if list.is_empty() {
                        self.receptors.remove(&source);
                    }
                }
            }
            SegmentKind::Proximal if was_connected => {
                self.set_connected_input(owner, source, false)?;
            }
            SegmentKind::Proximal => {}
        }

        self.synapses[synapse as usize].alive = false;
        self.free_synapses.push(synapse);
        Ok(())
    }

    /// Sets a synapse's permanence, clamped to the bounds of its segment kind,
    /// and keeps the connected bookkeeping in sync.
    pub fn update_synapse_permanence(
        &mut self,
        synapse: Synapse,
        permanence: Permanence,
    ) -> Result<()> {
        let Some(data) = self.synapses.get(synapse as usize) else {
            return Ok(());
        };
        if !data.alive {
            return Ok(());
        }
        let segment = data.segment;
        let source = data.source;
        let kind = self.segments[segment as usize].kind;
        let (lo, hi) = self.bounds_for(kind);
        let permanence = permanence.clamp(lo, hi);
        let threshold = self.threshold_for(kind);
        let was_connected = is_connected(data.permanence, threshold);
        let now_connected = is_connected(permanence, threshold);

        self.synapses[synapse as usize].permanence = permanence;

        if was_connected != now_connected {
            let segment_data = &mut self.segments[segment as usize];
            if now_connected {
                segment_data.num_connected += 1;
            } else {
                segment_data.num_connected = segment_data.num_connected.saturating_sub(1);
            }
            if kind == SegmentKind::Proximal {
                let column = segment_data.owner;
                self.set_connected_input(column, source, now_connected)?;
            }
        }
        Ok(())
    }

    /// Returns true when `synapse` names a live synapse.
    #[inline]
    pub fn is_synapse_alive(&self, synapse: Synapse) -> bool {
        self.synapses
            .get(synapse as usize)
            .is_some_and(|data| data.alive)
    }

    /// Number of live synapses.
    pub fn num_synapses(&self) -> usize {
        self.synapses.len() - self.free_synapses.len()
    }

    /// Number of synapses on a segment.
    #[inline]
    pub fn num_synapses_on_segment(&self, segment: Segment) -> usize {
        self.segments[segment as usize].synapses.len()
    }

    /// Gets the synapses on a segment.
    #[inline]
    pub fn synapses_for_segment(&self, segment: Segment) -> &[Synapse] {
        &self.segments[segment as usize].synapses
    }

    /// Gets the synapse data.
    #[inline]
    pub fn data_for_synapse(&self, synapse: Synapse) -> &SynapseData {
        &self.synapses[synapse as usize]
    }

    /// Gets the sources of a segment's synapses.
    pub fn sources_for_segment(&self, segment: Segment) -> Vec<u32> {
        self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| self.synapses[s as usize].source)
            .collect()
    }

    // ========================================================================
    // Activity computation
    // ========================================================================

    /// Counts, for every segment reached from `active_cells`, the synapses whose
    /// source is active (`potential`) and those among them whose permanence is
    /// at least `connected_threshold` (`active`).
    ///
    /// `active_cells` must not contain duplicates.
    pub fn compute_activity(
        &self,
        active_cells: &[CellIdx],
        connected_threshold: Permanence,
    ) -> SegmentActivity {
        let len = self.segments.len();
        let mut activity = SegmentActivity {
            active: vec![0; len],
            potential: vec![0; len],
        };

        for cell in active_cells {
            let Some(list) = self.receptors.get(cell) else {
                continue;
            };
            for &synapse in list {
                let data = &self.synapses[synapse as usize];
                let segment = data.segment as usize;
                activity.potential[segment] += 1;
                if is_connected(data.permanence, connected_threshold) {
                    activity.active[segment] += 1;
                }
            }
        }
        activity
    }

    // ========================================================================
    // Distal learning
    // ========================================================================

    /// Adapts a distal segment: synapses from `active_sources` (sorted) gain
    /// `increment`, the others lose `decrement`.
    ///
    /// Synapses falling below epsilon are destroyed, and so is the segment once
    /// it has no synapse left.
    pub fn adapt_segment(
        &mut self,
        segment: Segment,
        active_sources: &[CellIdx],
        increment: Permanence,
        decrement: Permanence,
    ) -> Result<()> {
        if !self.is_segment_alive(segment) {
            return Ok(());
        }

        let synapses: SmallVec<[Synapse; 32]> = self.segments[segment as usize].synapses.clone();
        for synapse in synapses {
            let data = &self.synapses[synapse as usize];
            let delta = if active_sources.binary_search(&data.source).is_ok() {
                increment
            } else {
                -decrement
            };
            let permanence = (data.permanence + delta).clamp(MIN_PERMANENCE, MAX_PERMANENCE);
            if permanence < EPSILON {
                self.destroy_synapse(synapse)?;
            } else {
                self.update_synapse_permanence(synapse, permanence)?;
            }
        }

        if self.segments[segment as usize].synapses.is_empty() {
            self.destroy_segment(segment)?;
        }
        Ok(())
    }

    /// Grows up to `max_new` synapses onto `segment` from a random sample of
    /// `candidates` (sorted) not already connected to it.
    ///
    /// When the segment would exceed `max_synapses_per_segment`, its weakest
    /// synapses from sources outside `candidates` are destroyed first.
    pub fn grow_synapses(
        &mut self,
        segment: Segment,
        candidates: &[CellIdx],
        max_new: usize,
        initial_permanence: Permanence,
        rng: &mut Random,
    ) -> Result<()> {
        if max_new == 0 || !self.is_segment_alive(segment) {
            return Ok(());
        }

        let existing: AHashSet<u32> = self.sources_for_segment(segment).into_iter().collect();
        let eligible: Vec<CellIdx> = candidates
            .iter()
            .copied()
            .filter(|c| !existing.contains(c))
            .collect();
        if eligible.is_empty() {
            return Ok(());
        }

        let mut num_new = max_new.min(eligible.len());
        let max_synapses = self.config.max_synapses_per_segment as usize;
        if max_synapses > 0 {
            let current = self.num_synapses_on_segment(segment);
            let overrun = (current + num_new).saturating_sub(max_synapses);
            if overrun > 0 {
                self.destroy_min_permanence_synapses(segment, overrun, candidates)?;
            }
            let room = max_synapses.saturating_sub(self.num_synapses_on_segment(segment));
            num_new = num_new.min(room);
        }

        let mut chosen = rng.sample(eligible, num_new);
        chosen.sort_unstable();
        for source in chosen {
            self.create_synapse(segment, source, initial_permanence)?;
        }
        Ok(())
    }

    /// Destroys the `count` weakest synapses of a segment, ignoring synapses
    /// whose source is in `exclude` (sorted). Ties go to the lower source.
    pub fn destroy_min_permanence_synapses(
        &mut self,
        segment: Segment,
        count: usize,
        exclude: &[CellIdx],
    ) -> Result<()> {
        if count == 0 || !self.is_segment_alive(segment) {
            return Ok(());
        }

        let mut candidates: Vec<(Permanence, u32, Synapse)> = self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| {
                let data = &self.synapses[s as usize];
                (data.permanence, data.source, s)
            })
            .filter(|(_, source, _)| exclude.binary_search(source).is_err())
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        for (_, _, synapse) in candidates.into_iter().take(count) {
            self.destroy_synapse(synapse)?;
        }
        Ok(())
    }

    // ========================================================================
    // Proximal dendrites
    // ========================================================================

    fn check_column(&self, column: ColumnIdx) -> Result<&Column> {
        self.columns
            .get(column as usize)
            .ok_or(NeocortexError::IndexOutOfBounds {
                index: column as usize,
                size: self.columns.len(),
            })
    }

    /// Returns the potential pool of a column, ascending.
    pub fn potential_pool(&self, column: ColumnIdx) -> Result<&[InputIdx]> {
        Ok(self.check_column(column)?.potential_pool.as_slice())
    }

    /// Replaces the potential pool of a column. Proximal synapses from inputs
    /// leaving the pool are destroyed.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` for an unknown column or an out-of-range input.
    pub fn set_potential_pool(&mut self, column: ColumnIdx, mut pool: Vec<InputIdx>) -> Result<()> {
        let segment = self.check_column(column)?.proximal_segment;
        let num_inputs = self.num_inputs();
        if let Some(&bad) = pool.iter().find(|&&i| i as usize >= num_inputs) {
            return Err(NeocortexError::IndexOutOfBounds {
                index: bad as usize,
                size: num_inputs,
            });
        }
        pool.sort_unstable();
        pool.dedup();

        let stale: Vec<Synapse> = self.segments[segment as usize]
            .synapses
            .iter()
            .copied()
            .filter(|&s| pool.binary_search(&self.synapses[s as usize].source).is_err())
            .collect();
        for synapse in stale {
            self.destroy_synapse(synapse)?;
        }

        self.columns[column as usize].potential_pool = pool;
        Ok(())
    }

    /// Returns the permanences of a column's pool, aligned with
    /// [`potential_pool`](Self::potential_pool). Inputs without a synapse read 0.
    pub fn pool_permanences(&self, column: ColumnIdx) -> Result<Vec<Permanence>> {
        let col = self.check_column(column)?;
        let mut permanences = vec![0.0; col.potential_pool.len()];
        for &synapse in &self.segments[col.proximal_segment as usize].synapses {
            let data = &self.synapses[synapse as usize];
            if let Ok(pos) = col.potential_pool.binary_search(&data.source) {
                permanences[pos] = data.permanence;
            }
        }
        Ok(permanences)
    }

    /// Writes the permanences of a column's pool, aligned with
    /// [`potential_pool`](Self::potential_pool).
    ///
    /// A value of zero or less removes the synapse; any other value creates or
    /// updates it. The connected-input matrix follows.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` when `permanences` is not as long as the pool.
    pub fn set_proximal_permanences(
        &mut self,
        column: ColumnIdx,
        permanences: &[Permanence],
    ) -> Result<()> {
        let col = self.check_column(column)?;
        if permanences.len() != col.potential_pool.len() {
            return Err(NeocortexError::DimensionMismatch {
                expected: col.potential_pool.len(),
                actual: permanences.len(),
            });
        }
        let segment = col.proximal_segment;
        let pool = col.potential_pool.clone();

        let existing: AHashMap<InputIdx, Synapse> = self.segments[segment as usize]
            .synapses
            .iter()
            .map(|&s| (self.synapses[s as usize].source, s))
            .collect();

        for (&input, &permanence) in pool.iter().zip(permanences) {
            match (existing.get(&input), permanence > 0.0) {
                (Some(&synapse), true) => self.update_synapse_permanence(synapse, permanence)?,
                (Some(&synapse), false) => self.destroy_synapse(synapse)?,
                (None, true) => {
                    self.create_synapse(segment, input, permanence)?;
                }
                (None, false) => {}
            }
        }
        Ok(())
    }

    /// Returns the connected input bits of a column, ascending.
    pub fn connected_inputs(&self, column: ColumnIdx) -> Vec<InputIdx> {
        self.connected_inputs
            .row_offsets(column as usize)
            .map(|i| i as InputIdx)
            .collect()
    }

    /// Returns the number of connected inputs of every column.
    pub fn connected_counts(&self) -> Vec<u32> {
        self.connected_inputs.true_counts()
    }

    /// Returns the column x input matrix of connected proximal synapses.
    pub fn connected_matrix(&self) -> &SparseBinaryMatrix {
        &self.connected_inputs
    }

    // ========================================================================
    // Engine state
    // ========================================================================

    /// Returns the boost factor of every column.
    pub fn boost_factors(&self) -> &[Real] {
        &self.boost_factors
    }

    /// Returns the overlap duty cycle of every column.
    pub fn overlap_duty_cycles(&self) -> &[Real] {
        &self.overlap_duty_cycles
    }

    /// Returns the active duty cycle of every column.
    pub fn active_duty_cycles(&self) -> &[Real] {
        &self.active_duty_cycles
    }

    /// Returns the minimum overlap duty cycle of every column.
    pub fn min_overlap_duty_cycles(&self) -> &[Real] {
        &self.min_overlap_duty_cycles
    }

    /// Returns the raw overlaps of the last spatial pooler cycle.
    pub fn overlaps(&self) -> &[u32] {
        &self.overlaps
    }

    /// Returns the boosted overlaps of the last spatial pooler cycle.
    pub fn boosted_overlaps(&self) -> &[Real] {
        &self.boosted_overlaps
    }

    /// Returns the current inhibition radius.
    pub fn inhibition_radius(&self) -> u32 {
        self.inhibition_radius
    }

    /// Returns the number of spatial pooler cycles run.
    pub fn sp_iteration(&self) -> u64 {
        self.sp_iteration
    }

    /// Returns the active cells of the last temporal memory cycle, ascending.
    pub fn active_cells(&self) -> &[CellIdx] {
        &self.active_cells
    }

    /// Returns the winner cells of the last temporal memory cycle, ascending.
    pub fn winner_cells(&self) -> &[CellIdx] {
        &self.winner_cells
    }

    /// Returns the active segments, in segment order.
    pub fn active_segments(&self) -> &[Segment] {
        &self.active_segments
    }

    /// Returns the matching segments, in segment order.
    pub fn matching_segments(&self) -> &[Segment] {
        &self.matching_segments
    }

    /// Returns the segment activity computed from the last active cells.
    pub fn last_activity(&self) -> &SegmentActivity {
        &self.last_activity
    }

    /// Summarizes the graph.
    pub fn statistics(&self) -> HtmStatistics {
        let mut stats = HtmStatistics {
            num_segments: self.num_segments(),
            num_distal_segments: self.num_distal_segments(),
            num_synapses: self.num_synapses(),
            ..Default::default()
        };

        let mut min = Permanence::INFINITY;
        let mut max = Permanence::NEG_INFINITY;
        let mut sum = 0.0;
        for data in self.synapses.iter().filter(|s| s.alive) {
            min = min.min(data.permanence);
            max = max.max(data.permanence);
            sum += data.permanence;
            let kind = self.segments[data.segment as usize].kind;
            if is_connected(data.permanence, self.threshold_for(kind)) {
                stats.num_connected_synapses += 1;
            }
        }
        if stats.num_synapses > 0 {
            stats.min_permanence = min;
            stats.max_permanence = max;
            stats.avg_permanence = sum / stats.num_synapses as Permanence;
        }

        let distal_synapses: usize = self
            .cells
            .iter()
            .flat_map(|cell| cell.segments.iter())
            .map(|&s| self.segments[s as usize].synapses.len())
            .sum();
        if stats.num_distal_segments > 0 {
            stats.avg_synapses_per_distal_segment =
                distal_synapses as Real / stats.num_distal_segments as Real;
        }
        stats
    }

    fn rebuild_indexes(&mut self) -> Result<()> {
        self.receptors.clear();
        self.connected_inputs = SparseBinaryMatrix::new(
            &[self.columns.len() as u32, self.num_inputs() as u32],
            false,
        )?;

        for synapse in 0..self.synapses.len() {
            let data = &self.synapses[synapse];
            if !data.alive {
                continue;
            }
            let (source, permanence, segment) = (data.source, data.permanence, data.segment);
            let (kind, owner) = {
                let segment_data = &self.segments[segment as usize];
                (segment_data.kind, segment_data.owner)
            };
            match kind {
                SegmentKind::Distal => self
                    .receptors
                    .entry(source)
                    .or_default()
                    .push(synapse as Synapse),
                SegmentKind::Proximal => {
                    if is_connected(permanence, self.config.syn_perm_connected) {
                        self.set_connected_input(owner, source, true)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for Connections {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
            && self.columns == other.columns
            && self.cells == other.cells
            && self.segments == other.segments
            && self.synapses == other.synapses
            && self.free_segments == other.free_segments
            && self.free_synapses == other.free_synapses
            && self.iteration == other.iteration
            && self.connected_inputs == other.connected_inputs
            && self.boost_factors == other.boost_factors
            && self.active_duty_cycles == other.active_duty_cycles
            && self.overlap_duty_cycles == other.overlap_duty_cycles
            && self.inhibition_radius == other.inhibition_radius
            && self.active_cells == other.active_cells
            && self.winner_cells == other.winner_cells
            && self.active_segments == other.active_segments
            && self.matching_segments == other.matching_segments
    }
}

/// Serialized form of [`Connections`]. Lookup indexes are rebuilt on load.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct ConnectionsState {
    config: HtmConfig,
    columns: Vec<Column>,
    cells: Vec<Cell>,
    segments: Vec<SegmentData>,
    free_segments: Vec<Segment>,
    synapses: Vec<SynapseData>,
    free_synapses: Vec<Synapse>,
    next_ordinal: u64,
    iteration: u64,
    boost_factors: Vec<Real>,
    overlap_duty_cycles: Vec<Real>,
    active_duty_cycles: Vec<Real>,
    min_overlap_duty_cycles: Vec<Real>,
    overlaps: Vec<u32>,
    boosted_overlaps: Vec<Real>,
    inhibition_radius: u32,
    sp_iteration: u64,
    sp_learn_iteration: u64,
    active_cells: Vec<CellIdx>,
    winner_cells: Vec<CellIdx>,
    active_segments: Vec<Segment>,
    matching_segments: Vec<Segment>,
    last_activity: SegmentActivity,
}

#[cfg(feature = "serde")]
impl From<Connections> for ConnectionsState {
    fn from(mem: Connections) -> Self {
        Self {
            config: mem.config,
            columns: mem.columns,
            cells: mem.cells,
            segments: mem.segments,
            free_segments: mem.free_segments,
            synapses: mem.synapses,
            free_synapses: mem.free_synapses,
            next_ordinal: mem.next_ordinal,
            iteration: mem.iteration,
            boost_factors: mem.boost_factors,
            overlap_duty_cycles: mem.overlap_duty_cycles,
            active_duty_cycles: mem.active_duty_cycles,
            min_overlap_duty_cycles: mem.min_overlap_duty_cycles,
            overlaps: mem.overlaps,
            boosted_overlaps: mem.boosted_overlaps,
            inhibition_radius: mem.inhibition_radius,
            sp_iteration: mem.sp_iteration,
            sp_learn_iteration: mem.sp_learn_iteration,
            active_cells: mem.active_cells,
            winner_cells: mem.winner_cells,
            active_segments: mem.active_segments,
            matching_segments: mem.matching_segments,
            last_activity: mem.last_activity,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<ConnectionsState> for Connections {
    type Error = NeocortexError;

    fn try_from(state: ConnectionsState) -> Result<Self> {
        let input_topology = state.config.input_topology()?;
        let column_topology = state.config.column_topology()?;
        if state.columns.len() != column_topology.num_elements()
            || state.cells.len() != state.columns.len() * state.config.cells_per_column as usize
        {
            return Err(NeocortexError::SerializationError {
                message: "column or cell count does not match the configuration".to_string(),
            });
        }

        let mut mem = Self {
            config: state.config,
            input_topology,
            column_topology,
            columns: state.columns,
            cells: state.cells,
            segments: state.segments,
            free_segments: state.free_segments,
            synapses: state.synapses,
            free_synapses: state.free_synapses,
            next_ordinal: state.next_ordinal,
            iteration: state.iteration,
            receptors: AHashMap::new(),
            connected_inputs: SparseBinaryMatrix::default(),
            boost_factors: state.boost_factors,
            overlap_duty_cycles: state.overlap_duty_cycles,
            active_duty_cycles: state.active_duty_cycles,
            min_overlap_duty_cycles: state.min_overlap_duty_cycles,
            overlaps: state.overlaps,
            boosted_overlaps: state.boosted_overlaps,
            inhibition_radius: state.inhibition_radius,
            sp_iteration: state.sp_iteration,
            sp_learn_iteration: state.sp_learn_iteration,
            active_cells: state.active_cells,
            winner_cells: state.winner_cells,
            active_segments: state.active_segments,
            matching_segments: state.matching_segments,
            last_activity: state.last_activity,
        };
        mem.rebuild_indexes()?;
        Ok(mem)
    }
}
