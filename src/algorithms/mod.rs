//! HTM algorithms implementation.
//!
//! This module contains the learning core of Hierarchical Temporal Memory:
//!
//! - **Configuration**: the parameters shared by both engines
//! - **Connections**: the column, cell, segment and synapse graph
//! - **Spatial Pooler**: creates sparse representations from input patterns
//! - **Temporal Memory**: learns temporal sequences
//! - **Homeostatic Plasticity Controller**: detects spatial pooler convergence

mod connections;
mod homeostatic;
mod htm_config;
mod spatial_pooler;
mod temporal_memory;

pub use connections::{
    Cell, Column, Connections, HtmStatistics, SegmentActivity, SegmentData, SegmentKind,
    SynapseData,
};
pub use homeostatic::{HomeostaticPlasticityController, StabilityCallback};
pub use htm_config::HtmConfig;
pub use spatial_pooler::SpatialPooler;
pub use temporal_memory::{ComputeCycle, TemporalMemory};
