//! Execution context handed to every primitive invocation
//!
//! All shared components are reached through explicit handles; there are no
//! ambient singletons. The arena is scoped to the invocation and reset by
//! the engine when the primitive returns, so nothing allocated in it may
//! escape.

use agrama_collab::{CrdtEngine, SessionRegistry};
use agrama_core::{
    AgramaError, AgramaResult, ArenaPool, Deadline, Limits, QueryArena, SafeTimer, Timestamp,
};
use agrama_graph::FreEngine;
use agrama_search::{Bm25Index, HnswIndex, HybridEngine};
use agrama_store::{GraphStore, TemporalStore};
use parking_lot::RwLock;
use std::sync::Arc;

use crate::provenance::ProvenanceLog;
use crate::transforms::TransformRegistry;

/// Shared component handles wired once at engine construction
#[derive(Clone)]
pub struct EngineHandles {
    /// Temporal record store
    pub store: Arc<TemporalStore>,
    /// Graph edge store
    pub graph: Arc<GraphStore>,
    /// Lexical index
    pub bm25: Arc<Bm25Index>,
    /// Vector index
    pub hnsw: Arc<RwLock<HnswIndex>>,
    /// Traversal engine
    pub fre: Arc<FreEngine>,
    /// Hybrid query engine
    pub hybrid: Arc<HybridEngine>,
    /// Collaboration engine
    pub crdt: Arc<CrdtEngine>,
    /// Agent session registry
    pub sessions: Arc<SessionRegistry>,
    /// Transform registry
    pub transforms: Arc<TransformRegistry>,
    /// Provenance log
    pub provenance: Arc<ProvenanceLog>,
    /// Arena pool for per-invocation scratch
    pub arenas: Arc<ArenaPool>,
    /// Engine limits
    pub limits: Limits,
    /// Degrading clock
    pub timer: Arc<SafeTimer>,
}

/// Per-invocation context
pub struct PrimitiveContext<'a> {
    /// Shared handles
    pub handles: &'a EngineHandles,
    /// Invocation-scoped scratch; reset by the engine on return
    pub arena: &'a mut QueryArena,
    /// Calling agent
    pub agent_id: &'a str,
    /// Calling agent's session
    pub session_id: &'a str,
    /// Invocation timestamp
    pub timestamp: Timestamp,
    /// Cooperative deadline
    pub deadline: Deadline,
    /// Events for the engine to publish after the primitive returns
    pub events: Vec<agrama_core::EngineEvent>,
}

impl PrimitiveContext<'_> {
    /// Cooperative cancellation checkpoint
    pub fn check_deadline(&self, operation: &str) -> AgramaResult<()> {
        if self.deadline.expired() {
            Err(AgramaError::deadline_exceeded(
                operation,
                self.deadline.elapsed_ms(),
            ))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_check_deadline() {
        // Handles are not needed to exercise the checkpoint itself
        let expired = Deadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(1));
        assert!(expired.expired());

        let live = Deadline::unbounded();
        assert!(!live.expired());
    }
}
