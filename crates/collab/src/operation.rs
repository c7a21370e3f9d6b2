//! CRDT operations and conflict records

use crate::clock::VectorClock;
use crate::position::Position;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique operation identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// A fresh random id
    pub fn new() -> Self {
        OperationId(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

/// What an operation does to the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Insert `payload` at `position`
    Insert,
    /// Tombstone the element at `position`
    Delete,
    /// Overwrite the payload of the element at `position`
    Replace,
}

/// One operation in a document's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrdtOperation {
    /// Operation identity
    pub id: OperationId,
    /// Issuing agent
    pub agent_id: String,
    /// Operation kind
    pub kind: OpKind,
    /// Target position
    pub position: Position,
    /// Inserted or replacement bytes; empty for deletes
    pub payload: Vec<u8>,
    /// The issuer's clock at issue time (already incremented)
    pub clock: VectorClock,
    /// Operations that must be applied before this one
    pub deps: Vec<OperationId>,
}

impl CrdtOperation {
    /// Last-writer-wins magnitude: `(clock component sum, agent id)`
    pub fn lww_rank(&self) -> (u64, &str) {
        (self.clock.sum(), self.agent_id.as_str())
    }
}

/// Lifecycle of an operation inside a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpState {
    /// Received, not yet examined
    Pending,
    /// Waiting on missing causal dependencies
    Buffered,
    /// Applied without conflict
    Applied,
    /// Applied after conflict resolution
    Resolved,
    /// Resolver explicitly rejected it (the default resolver never does)
    Rejected,
}

/// A detected conflict between two concurrent operations
///
/// Identity is the unordered operation pair, so replicas that observe the
/// same conflict in either order record equal events.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct ConflictEvent {
    /// Document key
    pub document: String,
    /// The two conflicting operation ids, sorted
    pub operations: (OperationId, OperationId),
    /// The two agents involved, sorted
    pub agents: (String, String),
    /// Strategy that resolved the conflict
    pub strategy: String,
    /// Winning agent when the strategy picks one
    pub winner: Option<String>,
}

impl ConflictEvent {
    /// Build with normalized (sorted) identity
    pub fn new(
        document: &str,
        a: (OperationId, &str),
        b: (OperationId, &str),
        strategy: &str,
        winner: Option<String>,
    ) -> Self {
        let ((op1, agent1), (op2, agent2)) = if a.0 <= b.0 { (a, b) } else { (b, a) };
        ConflictEvent {
            document: document.to_string(),
            operations: (op1, op2),
            agents: (agent1.to_string(), agent2.to_string()),
            strategy: strategy.to_string(),
            winner,
        }
    }
}

impl PartialEq for ConflictEvent {
    fn eq(&self, other: &Self) -> bool {
        self.document == other.document && self.operations == other.operations
    }
}

impl std::hash::Hash for ConflictEvent {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.document.hash(state);
        self.operations.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_event_identity_is_order_independent() {
        let op_a = OperationId::new();
        let op_b = OperationId::new();
        let e1 = ConflictEvent::new("doc", (op_a, "a"), (op_b, "b"), "lww", None);
        let e2 = ConflictEvent::new("doc", (op_b, "b"), (op_a, "a"), "lww", None);
        assert_eq!(e1, e2);
        assert_eq!(e1.operations, e2.operations);
    }

    #[test]
    fn test_lww_rank() {
        let mut clock = VectorClock::new();
        clock.increment("a");
        clock.increment("b");
        let op = CrdtOperation {
            id: OperationId::new(),
            agent_id: "a".into(),
            kind: OpKind::Insert,
            position: Position::root("a"),
            payload: b"x".to_vec(),
            clock,
            deps: vec![],
        };
        assert_eq!(op.lww_rank(), (2, "a"));
    }

    #[test]
    fn test_operation_serialization_roundtrip() {
        let op = CrdtOperation {
            id: OperationId::new(),
            agent_id: "agent-1".into(),
            kind: OpKind::Replace,
            position: Position::root("agent-1"),
            payload: b"hello".to_vec(),
            clock: VectorClock::new(),
            deps: vec![OperationId::new()],
        };
        let json = serde_json::to_string(&op).unwrap();
        let back: CrdtOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
