//! Primitive execution engine for Agrama
//!
//! Five composable primitives (store, retrieve, search, link, transform)
//! plus the collaborative surface, executed under a uniform contract:
//! validate, run with a pooled arena and a cooperative deadline, reset the
//! arena, record provenance, emit a broadcast event.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod engine;
pub mod provenance;
pub mod transforms;

pub use context::{EngineHandles, PrimitiveContext};
pub use engine::{EventSink, PrimitiveEngine, PrimitiveSpec};
pub use provenance::{ProvenanceLog, ProvenanceRecord};
pub use transforms::{TransformFn, TransformRegistry};
