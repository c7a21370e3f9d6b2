//! Broadcast event payloads
//!
//! Events are emitted by the primitive engine, the CRDT layer, and the
//! session registry, and consumed by the out-of-process visualization feed.
//! They are plain serde values; delivery is handled by the server crate.

use crate::timer::Timestamp;
use serde::{Deserialize, Serialize};

/// An event published on the engine's broadcast feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A primitive finished executing (successfully or not)
    PrimitiveExecuted {
        /// Primitive name
        primitive: String,
        /// Agent that issued the call
        agent_id: String,
        /// Key touched, when the primitive targets one
        key: Option<String>,
        /// Whether execution succeeded
        success: bool,
        /// Execution wall time in microseconds
        duration_micros: u64,
        /// When the event was recorded
        timestamp: Timestamp,
    },

    /// A CRDT operation was applied to a document
    CrdtOperation {
        /// Document key
        document: String,
        /// Issuing agent
        agent_id: String,
        /// Operation kind (insert, delete, replace)
        kind: String,
        /// When the operation was applied
        timestamp: Timestamp,
    },

    /// Two concurrent operations overlapped
    ConflictDetected {
        /// Document key
        document: String,
        /// Agents on either side of the conflict
        agents: (String, String),
        /// When the conflict was observed
        timestamp: Timestamp,
    },

    /// A detected conflict was resolved
    ConflictResolved {
        /// Document key
        document: String,
        /// Strategy that produced the resolution
        strategy: String,
        /// Agent whose operation won, when the strategy picks one
        winner: Option<String>,
        /// When the resolution was applied
        timestamp: Timestamp,
    },

    /// An agent session was created
    AgentJoined {
        /// New agent
        agent_id: String,
        /// Display name supplied at registration
        display_name: String,
        /// When the session was created
        timestamp: Timestamp,
    },

    /// An agent session ended (disconnect, idle reap, or emergency close)
    AgentLeft {
        /// Departed agent
        agent_id: String,
        /// Why the session ended
        reason: String,
        /// When the session ended
        timestamp: Timestamp,
    },
}

impl EngineEvent {
    /// Short name used for subscription filtering and logs
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::PrimitiveExecuted { .. } => "primitive_executed",
            EngineEvent::CrdtOperation { .. } => "crdt_operation",
            EngineEvent::ConflictDetected { .. } => "conflict_detected",
            EngineEvent::ConflictResolved { .. } => "conflict_resolved",
            EngineEvent::AgentJoined { .. } => "agent_joined",
            EngineEvent::AgentLeft { .. } => "agent_left",
        }
    }
}
