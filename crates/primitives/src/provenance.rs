//! Provenance log
//!
//! Bounded in-memory record of who executed which primitive, when, on what
//! key, and whether it succeeded. Oldest records are dropped when the cap
//! is reached.

use agrama_core::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// One provenance record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Record identity
    pub id: Uuid,
    /// Executing agent
    pub agent_id: String,
    /// Session the call ran under
    pub session_id: String,
    /// Primitive name
    pub primitive: String,
    /// Key targeted by the call, when the primitive targets one
    pub key: Option<String>,
    /// Invocation timestamp
    pub timestamp: Timestamp,
    /// Wall-clock time in RFC 3339, for operator-facing tooling
    pub wall_time: String,
    /// Whether execution succeeded
    pub success: bool,
    /// Execution time in microseconds
    pub duration_micros: u64,
}

/// Bounded append-only provenance store
pub struct ProvenanceLog {
    records: Mutex<VecDeque<ProvenanceRecord>>,
    cap: usize,
}

impl ProvenanceLog {
    /// Create a log retaining at most `cap` records
    pub fn new(cap: usize) -> Self {
        ProvenanceLog {
            records: Mutex::new(VecDeque::with_capacity(cap.min(1024))),
            cap: cap.max(1),
        }
    }

    /// Append a record, evicting the oldest at capacity
    pub fn append(&self, record: ProvenanceRecord) {
        let mut records = self.records.lock();
        if records.len() >= self.cap {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Most recent records, newest first, optionally filtered by agent
    pub fn recent(&self, agent: Option<&str>, limit: usize) -> Vec<ProvenanceRecord> {
        let records = self.records.lock();
        records
            .iter()
            .rev()
            .filter(|r| agent.map_or(true, |a| r.agent_id == a))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Records within a timestamp window, newest first
    pub fn in_range(&self, since: Timestamp, until: Timestamp) -> Vec<ProvenanceRecord> {
        let records = self.records.lock();
        records
            .iter()
            .rev()
            .filter(|r| r.timestamp >= since && r.timestamp <= until)
            .cloned()
            .collect()
    }

    /// Number of retained records
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(agent: &str, primitive: &str, ts: u64) -> ProvenanceRecord {
        ProvenanceRecord {
            id: Uuid::new_v4(),
            agent_id: agent.to_string(),
            session_id: "s".into(),
            primitive: primitive.to_string(),
            key: None,
            timestamp: Timestamp(ts),
            wall_time: String::new(),
            success: true,
            duration_micros: 10,
        }
    }

    #[test]
    fn test_append_and_recent() {
        let log = ProvenanceLog::new(100);
        log.append(record("a", "store", 1));
        log.append(record("b", "retrieve", 2));
        log.append(record("a", "search", 3));

        let recent = log.recent(None, 10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].primitive, "search");

        let for_a = log.recent(Some("a"), 10);
        assert_eq!(for_a.len(), 2);
        assert!(for_a.iter().all(|r| r.agent_id == "a"));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = ProvenanceLog::new(2);
        log.append(record("a", "store", 1));
        log.append(record("a", "store", 2));
        log.append(record("a", "store", 3));
        assert_eq!(log.len(), 2);
        let recent = log.recent(None, 10);
        assert_eq!(recent[0].timestamp, Timestamp(3));
        assert_eq!(recent[1].timestamp, Timestamp(2));
    }

    #[test]
    fn test_in_range() {
        let log = ProvenanceLog::new(100);
        for ts in [10, 20, 30, 40] {
            log.append(record("a", "store", ts));
        }
        let hits = log.in_range(Timestamp(15), Timestamp(35));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].timestamp, Timestamp(30));
    }
}
