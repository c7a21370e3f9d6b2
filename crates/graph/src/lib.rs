//! Frontier Reduction Engine for Agrama
//!
//! Bounded single- and multi-source shortest path over the graph store's
//! frozen snapshots, with frontier blocks, pivot selection, and a density
//! pre-check that falls back to a plain priority-queue traversal.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod frontier;

pub use engine::{
    should_use_fre, FreConfig, FreEngine, ImpactResult, TraversalResult, TraversalStats,
    TraversalStrategy,
};
pub use frontier::{FreWorkspace, FrontierEntry, FrontierParams};
