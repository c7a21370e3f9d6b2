//! Storage layer for Agrama
//!
//! Two stores live here:
//! - [`TemporalStore`]: current value plus bounded anchor+delta history per
//!   key, with snapshot reads and retention.
//! - [`GraphStore`]: directed labeled weighted edges over keys, with a
//!   frozen CSR snapshot for traversal queries.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod graph;
pub mod retention;
pub mod temporal;

pub use graph::{
    Direction, EdgeId, EdgeRecord, GraphExport, GraphSnapshot, GraphStats, GraphStore, NodeId,
};
pub use retention::{RetentionPolicy, RetentionStats};
pub use temporal::{
    ChangeEvent, SerializedRecord, StoreStats, TemporalRecord, TemporalStore,
};
