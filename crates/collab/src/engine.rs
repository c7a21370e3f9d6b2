//! CRDT engine: document registry and operation routing
//!
//! One [`CrdtDocument`] per key, each behind its own lock. Operation
//! handling returns the broadcast events the caller should publish; the
//! engine itself holds no channel.

use crate::document::{ConflictStrategy, CrdtDocument};
use crate::operation::{ConflictEvent, CrdtOperation, OpState};
use crate::position::Position;
use agrama_core::{AgramaError, AgramaResult, EngineEvent, Timestamp};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// An edit issued by a local agent against the materialized view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Insert bytes at a visible element index
    Insert {
        /// Visible element index (0..=len)
        index: usize,
        /// Bytes to insert
        payload: Vec<u8>,
    },
    /// Tombstone the visible element at an index
    Delete {
        /// Visible element index
        index: usize,
    },
    /// Overwrite the visible element at an index
    Replace {
        /// Visible element index
        index: usize,
        /// Replacement bytes
        payload: Vec<u8>,
    },
}

/// Outcome of one operation, with events for the broadcast feed
#[derive(Debug)]
pub struct OpOutcome {
    /// The operation (for relaying to other replicas on local edits)
    pub operation: CrdtOperation,
    /// Terminal pipeline state
    pub state: OpState,
    /// Events to publish
    pub events: Vec<EngineEvent>,
}

/// The collaboration engine
pub struct CrdtEngine {
    documents: DashMap<String, Arc<Mutex<CrdtDocument>>>,
    strategy: ConflictStrategy,
    buffer_cap: usize,
}

impl CrdtEngine {
    /// Create an engine using the given resolution strategy
    pub fn new(strategy: ConflictStrategy, buffer_cap: usize) -> Self {
        CrdtEngine {
            documents: DashMap::new(),
            strategy,
            buffer_cap,
        }
    }

    /// Open (or create) a document
    pub fn open(&self, key: &str) -> Arc<Mutex<CrdtDocument>> {
        let entry = self.documents.entry(key.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(CrdtDocument::new(
                key,
                self.strategy.clone(),
                self.buffer_cap,
            )))
        });
        Arc::clone(entry.value())
    }

    /// Fetch an existing document
    pub fn document(&self, key: &str) -> AgramaResult<Arc<Mutex<CrdtDocument>>> {
        self.documents
            .get(key)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| AgramaError::document_not_found(key))
    }

    /// Document keys currently open
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.documents.iter().map(|d| d.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Apply a local edit, producing the operation to relay
    pub fn apply_local(
        &self,
        key: &str,
        agent: &str,
        edit: Edit,
        now: Timestamp,
    ) -> AgramaResult<OpOutcome> {
        let doc = self.open(key);
        let mut doc = doc.lock();
        let conflicts_before = doc.conflicts().len();

        let operation = match edit {
            Edit::Insert { index, payload } => doc.local_insert(agent, index, payload)?,
            Edit::Delete { index } => doc.local_delete(agent, index)?,
            Edit::Replace { index, payload } => doc.local_replace(agent, index, payload)?,
        };

        let events = self.events_for(&doc, &operation, conflicts_before, now);
        Ok(OpOutcome {
            state: OpState::Applied,
            operation,
            events,
        })
    }

    /// Apply an operation received from another replica
    pub fn apply_remote(
        &self,
        key: &str,
        operation: CrdtOperation,
        now: Timestamp,
    ) -> AgramaResult<OpOutcome> {
        let doc = self.open(key);
        let mut doc = doc.lock();
        let conflicts_before = doc.conflicts().len();

        let state = doc.apply(operation.clone())?;
        let events = self.events_for(&doc, &operation, conflicts_before, now);
        Ok(OpOutcome {
            operation,
            state,
            events,
        })
    }

    fn events_for(
        &self,
        doc: &CrdtDocument,
        operation: &CrdtOperation,
        conflicts_before: usize,
        now: Timestamp,
    ) -> Vec<EngineEvent> {
        let mut events = vec![EngineEvent::CrdtOperation {
            document: doc.key().to_string(),
            agent_id: operation.agent_id.clone(),
            kind: format!("{:?}", operation.kind).to_lowercase(),
            timestamp: now,
        }];
        for conflict in &doc.conflicts()[conflicts_before..] {
            events.push(EngineEvent::ConflictDetected {
                document: doc.key().to_string(),
                agents: (conflict.agents.0.clone(), conflict.agents.1.clone()),
                timestamp: now,
            });
            events.push(EngineEvent::ConflictResolved {
                document: doc.key().to_string(),
                strategy: conflict.strategy.clone(),
                winner: conflict.winner.clone(),
                timestamp: now,
            });
        }
        events
    }

    /// Merge two documents' logs both ways, by causal order
    pub fn synchronize(&self, key_a: &str, key_b: &str) -> AgramaResult<()> {
        let doc_a = self.document(key_a)?;
        let doc_b = self.document(key_b)?;
        // Lock in key order so concurrent synchronize calls cannot deadlock
        let (first, second) = if key_a <= key_b {
            (&doc_a, &doc_b)
        } else {
            (&doc_b, &doc_a)
        };
        let mut first = first.lock();
        let mut second = second.lock();
        let snapshot: Vec<CrdtOperation> = first.log().to_vec();
        first.merge_from(&second)?;
        for op in snapshot {
            second.apply(op)?;
        }
        Ok(())
    }

    /// Record an agent's cursor in a document
    pub fn cursor_update(&self, key: &str, agent: &str, position: Position) -> AgramaResult<()> {
        let doc = self.document(key)?;
        doc.lock().cursor_update(agent, position);
        Ok(())
    }

    /// Conflicts observed on a document
    pub fn conflicts(&self, key: &str) -> AgramaResult<Vec<ConflictEvent>> {
        let doc = self.document(key)?;
        let doc = doc.lock();
        Ok(doc.conflicts().to_vec())
    }

    /// Materialized text of a document
    pub fn read(&self, key: &str) -> AgramaResult<String> {
        let doc = self.document(key)?;
        let doc = doc.lock();
        Ok(doc.text())
    }

    /// Export all documents' logs for the persistence hook
    pub fn export(&self) -> Vec<(String, Vec<CrdtOperation>)> {
        let mut out: Vec<(String, Vec<CrdtOperation>)> = self
            .documents
            .iter()
            .map(|d| (d.key().clone(), d.value().lock().log().to_vec()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Rebuild documents from exported logs
    pub fn restore(&self, docs: Vec<(String, Vec<CrdtOperation>)>) -> AgramaResult<()> {
        self.documents.clear();
        for (key, log) in docs {
            let doc = self.open(&key);
            let mut doc = doc.lock();
            for op in log {
                doc.apply(op)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CrdtEngine {
        CrdtEngine::new(ConflictStrategy::default(), 1024)
    }

    #[test]
    fn test_local_edit_and_read() {
        let e = engine();
        e.apply_local(
            "doc",
            "a",
            Edit::Insert {
                index: 0,
                payload: b"hi".to_vec(),
            },
            Timestamp(1),
        )
        .unwrap();
        assert_eq!(e.read("doc").unwrap(), "hi");
    }

    #[test]
    fn test_read_missing_document() {
        let e = engine();
        assert!(matches!(
            e.read("nope"),
            Err(AgramaError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn test_local_edit_emits_operation_event() {
        let e = engine();
        let outcome = e
            .apply_local(
                "doc",
                "a",
                Edit::Insert {
                    index: 0,
                    payload: b"x".to_vec(),
                },
                Timestamp(5),
            )
            .unwrap();
        assert_eq!(outcome.events.len(), 1);
        assert!(matches!(
            &outcome.events[0],
            EngineEvent::CrdtOperation { document, kind, .. }
                if document == "doc" && kind == "insert"
        ));
    }

    #[test]
    fn test_remote_relay_between_documents() {
        let e = engine();
        let outcome = e
            .apply_local(
                "replica-a",
                "agent-a",
                Edit::Insert {
                    index: 0,
                    payload: b"z".to_vec(),
                },
                Timestamp(1),
            )
            .unwrap();

        let remote = e
            .apply_remote("replica-b", outcome.operation, Timestamp(2))
            .unwrap();
        assert_eq!(remote.state, OpState::Applied);
        assert_eq!(e.read("replica-b").unwrap(), "z");
    }

    #[test]
    fn test_conflict_emits_detected_and_resolved() {
        let e = engine();
        // Two replicas of the same logical document, seeded identically
        for (i, ch) in "abc".bytes().enumerate() {
            let out = e
                .apply_local(
                    "ra",
                    "seed",
                    Edit::Insert {
                        index: i,
                        payload: vec![ch],
                    },
                    Timestamp(1),
                )
                .unwrap();
            e.apply_remote("rb", out.operation, Timestamp(1)).unwrap();
        }

        let op_a = e
            .apply_local(
                "ra",
                "agent-a",
                Edit::Replace {
                    index: 1,
                    payload: b"X".to_vec(),
                },
                Timestamp(2),
            )
            .unwrap();
        let op_b = e
            .apply_local(
                "rb",
                "agent-b",
                Edit::Replace {
                    index: 1,
                    payload: b"Y".to_vec(),
                },
                Timestamp(2),
            )
            .unwrap();

        let outcome = e.apply_remote("ra", op_b.operation, Timestamp(3)).unwrap();
        assert_eq!(outcome.state, OpState::Resolved);
        let kinds: Vec<&str> = outcome.events.iter().map(|ev| ev.kind()).collect();
        assert!(kinds.contains(&"conflict_detected"));
        assert!(kinds.contains(&"conflict_resolved"));

        e.apply_remote("rb", op_a.operation, Timestamp(3)).unwrap();
        assert_eq!(e.read("ra").unwrap(), e.read("rb").unwrap());
    }

    #[test]
    fn test_synchronize_converges_documents() {
        let e = engine();
        e.apply_local(
            "a",
            "agent-a",
            Edit::Insert {
                index: 0,
                payload: b"left".to_vec(),
            },
            Timestamp(1),
        )
        .unwrap();
        e.apply_local(
            "b",
            "agent-b",
            Edit::Insert {
                index: 0,
                payload: b"right".to_vec(),
            },
            Timestamp(1),
        )
        .unwrap();

        e.synchronize("a", "b").unwrap();
        assert_eq!(e.read("a").unwrap(), e.read("b").unwrap());
    }

    #[test]
    fn test_export_restore() {
        let e = engine();
        e.apply_local(
            "doc",
            "a",
            Edit::Insert {
                index: 0,
                payload: b"persist me".to_vec(),
            },
            Timestamp(1),
        )
        .unwrap();

        let exported = e.export();
        let restored = engine();
        restored.restore(exported).unwrap();
        assert_eq!(restored.read("doc").unwrap(), "persist me");
    }

    #[test]
    fn test_cursor_update_through_engine() {
        let e = engine();
        e.apply_local(
            "doc",
            "a",
            Edit::Insert {
                index: 0,
                payload: b"x".to_vec(),
            },
            Timestamp(1),
        )
        .unwrap();
        let pos = Position::root("b");
        e.cursor_update("doc", "b", pos.clone()).unwrap();
        let doc = e.document("doc").unwrap();
        assert_eq!(doc.lock().cursors().get("b"), Some(&pos));
    }
}
