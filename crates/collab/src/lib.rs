//! Collaboration layer for Agrama
//!
//! Conflict-free collaborative editing for multiple concurrent agents:
//! vector clocks, causally stable positions, per-document operation logs
//! with buffering and pluggable conflict resolution, and the agent session
//! registry.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod document;
pub mod engine;
pub mod operation;
pub mod position;
pub mod session;

pub use clock::{ClockOrder, VectorClock};
pub use document::{ConflictStrategy, CrdtDocument};
pub use engine::{CrdtEngine, Edit, OpOutcome};
pub use operation::{ConflictEvent, CrdtOperation, OpKind, OpState, OperationId};
pub use position::Position;
pub use session::{AgentSession, SessionConfig, SessionRegistry};
