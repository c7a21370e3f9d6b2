//! Temporal record store
//!
//! Holds the current value plus a bounded reverse-chronological history for
//! every key. Records are immutable snapshots behind `Arc`: a write builds
//! the successor record and swaps it in under the per-key map entry, so
//! readers always observe a complete record without taking the writer lock.
//!
//! History uses anchor+delta compression. Every `anchor_interval`-th version
//! is stored whole; versions in between are stored as copy/insert deltas
//! against the previous materialized value. Only materialized values are
//! ever exposed.

use crate::retention::{RetentionPolicy, RetentionStats};
use agrama_core::{
    validate_key_with_limits, AgramaError, AgramaResult, Limits, Metadata, Timestamp, Value,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffOp};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Values larger than this are always stored as anchors; byte-level diffing
/// degrades on large inputs.
const MAX_DELTA_INPUT: usize = 256 * 1024;

/// Copy/insert instruction against the previous materialized value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaOp {
    /// Copy `len` bytes starting at `start` from the previous version
    Copy {
        /// Byte offset into the previous version
        start: u32,
        /// Number of bytes to copy
        len: u32,
    },
    /// Append literal bytes
    Insert(Vec<u8>),
}

/// How one version is physically stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum VersionPayload {
    /// Full value snapshot
    Anchor(Value),
    /// Delta against the previous materialized version
    Delta(Vec<DeltaOp>),
}

/// One stored version of a key
#[derive(Debug, Clone, PartialEq)]
struct VersionEntry {
    timestamp: Timestamp,
    metadata: Metadata,
    payload: VersionPayload,
}

/// Immutable snapshot of one key's record
#[derive(Debug)]
pub struct TemporalRecord {
    key: String,
    current: Value,
    metadata: Metadata,
    /// Oldest first; the first entry is always an anchor
    versions: Vec<VersionEntry>,
}

impl TemporalRecord {
    /// The record's key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Most recent value
    pub fn current(&self) -> &Value {
        &self.current
    }

    /// Metadata of the most recent version
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Timestamp of the most recent version
    pub fn timestamp(&self) -> Timestamp {
        self.versions.last().map(|v| v.timestamp).unwrap_or_default()
    }

    /// Number of retained versions
    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Materialize up to `limit` versions, newest first
    pub fn history(&self, limit: usize) -> Vec<(Timestamp, Value)> {
        if limit == 0 || self.versions.is_empty() {
            return Vec::new();
        }
        let take = limit.min(self.versions.len());
        let oldest_wanted = self.versions.len() - take;

        // Rewind to the nearest anchor at or before the oldest requested
        // version, then roll deltas forward.
        let anchor_idx = (0..=oldest_wanted)
            .rev()
            .find(|&i| matches!(self.versions[i].payload, VersionPayload::Anchor(_)))
            .unwrap_or(0);

        let mut out = Vec::with_capacity(take);
        let mut previous: Vec<u8> = Vec::new();
        for (i, entry) in self.versions.iter().enumerate().skip(anchor_idx) {
            let bytes = match &entry.payload {
                VersionPayload::Anchor(v) => v.as_bytes().to_vec(),
                VersionPayload::Delta(ops) => apply_delta(&previous, ops),
            };
            if i >= oldest_wanted {
                out.push((entry.timestamp, Value::new(bytes.clone())));
            }
            previous = bytes;
        }
        out.reverse();
        out
    }

    /// Approximate resident bytes of this record
    fn resident_bytes(&self) -> usize {
        self.current.len()
            + self
                .versions
                .iter()
                .map(|v| match &v.payload {
                    VersionPayload::Anchor(a) => a.len(),
                    VersionPayload::Delta(ops) => ops
                        .iter()
                        .map(|op| match op {
                            DeltaOp::Copy { .. } => 8,
                            DeltaOp::Insert(b) => b.len(),
                        })
                        .sum(),
                })
                .sum::<usize>()
    }
}

/// Change notification delivered to subscribed listeners
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Key that was written
    pub key: String,
    /// Timestamp assigned to the write
    pub timestamp: Timestamp,
    /// Size of the new value in bytes
    pub value_len: usize,
}

type ChangeListener = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Aggregate store statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of keys with a record
    pub records: usize,
    /// Total retained versions across keys
    pub versions: usize,
    /// Approximate resident bytes
    pub resident_bytes: usize,
    /// Writes accepted since construction
    pub writes: u64,
}

/// The temporal store
pub struct TemporalStore {
    records: DashMap<String, Arc<TemporalRecord>>,
    limits: Limits,
    retention: RetentionPolicy,
    anchor_interval: usize,
    listeners: RwLock<Vec<ChangeListener>>,
    writes: AtomicU64,
}

impl TemporalStore {
    /// Create a store. The retention policy is derived from the limits.
    pub fn new(limits: Limits) -> Self {
        let retention = RetentionPolicy {
            max_entries: limits.max_history_entries,
            max_age_secs: limits.max_history_age_secs,
        };
        TemporalStore {
            records: DashMap::new(),
            limits,
            retention,
            anchor_interval: 4,
            listeners: RwLock::new(Vec::new()),
            writes: AtomicU64::new(0),
        }
    }

    /// Builder: replace the retention policy
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Subscribe to change events. Listeners run inline on the writer.
    pub fn on_change(&self, listener: impl Fn(&ChangeEvent) + Send + Sync + 'static) {
        self.listeners.write().push(Box::new(listener));
    }

    /// Write a value. Returns the timestamp assigned to the version.
    ///
    /// Validation happens before any state is touched; a failed write leaves
    /// no partial state.
    pub fn put(
        &self,
        key: &str,
        value: Value,
        metadata: Metadata,
        timestamp: Timestamp,
    ) -> AgramaResult<Timestamp> {
        validate_key_with_limits(key, &self.limits)
            .map_err(|e| AgramaError::invalid_key(key, e.to_string()))?;
        self.limits
            .check_value_size(value.len())
            .map_err(|(actual, max)| AgramaError::value_too_large(actual, max))?;

        let value_len = value.len();
        // The map entry is the per-key writer lock; the new record is built
        // outside the hot section where possible and swapped in whole.
        let mut entry = self.records.entry(key.to_string()).or_insert_with(|| {
            Arc::new(TemporalRecord {
                key: key.to_string(),
                current: Value::default(),
                metadata: Metadata::new(),
                versions: Vec::new(),
            })
        });

        let old = entry.value();
        let mut versions = old.versions.clone();

        // Timestamps are strictly increasing per key even if the caller's
        // clock stalls.
        let timestamp = match versions.last() {
            Some(last) if timestamp <= last.timestamp => Timestamp(last.timestamp.0 + 1),
            _ => timestamp,
        };

        let payload = self.encode_payload(&versions, old.current.as_bytes(), &value);
        versions.push(VersionEntry {
            timestamp,
            metadata: metadata.clone(),
            payload,
        });

        self.prune_versions(&mut versions, timestamp);

        *entry = Arc::new(TemporalRecord {
            key: key.to_string(),
            current: value,
            metadata,
            versions,
        });
        drop(entry);

        self.writes.fetch_add(1, Ordering::Relaxed);
        let event = ChangeEvent {
            key: key.to_string(),
            timestamp,
            value_len,
        };
        for listener in self.listeners.read().iter() {
            listener(&event);
        }

        Ok(timestamp)
    }

    /// Choose anchor or delta representation for a new version
    fn encode_payload(
        &self,
        versions: &[VersionEntry],
        previous: &[u8],
        value: &Value,
    ) -> VersionPayload {
        let due_for_anchor = versions.len() % self.anchor_interval == 0;
        if due_for_anchor
            || previous.is_empty()
            || previous.len() > MAX_DELTA_INPUT
            || value.len() > MAX_DELTA_INPUT
        {
            return VersionPayload::Anchor(value.clone());
        }
        VersionPayload::Delta(encode_delta(previous, value.as_bytes()))
    }

    /// Drop expired oldest versions, re-anchoring the cut point
    fn prune_versions(&self, versions: &mut Vec<VersionEntry>, now: Timestamp) {
        let stamps: Vec<Timestamp> = versions.iter().map(|v| v.timestamp).collect();
        let drop = self.retention.prune_count(&stamps, now);
        if drop == 0 {
            return;
        }

        // Materialize the survivor at the cut point so the history still
        // starts from an anchor.
        let mut previous: Vec<u8> = Vec::new();
        for entry in versions.iter().take(drop + 1) {
            previous = match &entry.payload {
                VersionPayload::Anchor(v) => v.as_bytes().to_vec(),
                VersionPayload::Delta(ops) => apply_delta(&previous, ops),
            };
        }
        versions.drain(0..drop);
        versions[0].payload = VersionPayload::Anchor(Value::new(previous));
    }

    /// Read the current record snapshot
    pub fn get(&self, key: &str) -> Option<Arc<TemporalRecord>> {
        self.records.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Read the current value, erroring when absent
    pub fn get_value(&self, key: &str) -> AgramaResult<Value> {
        self.get(key)
            .map(|r| r.current().clone())
            .ok_or_else(|| AgramaError::not_found(key))
    }

    /// Whether a record exists for the key
    pub fn exists(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// Materialized history, newest first
    pub fn history(&self, key: &str, limit: usize) -> AgramaResult<Vec<(Timestamp, Value)>> {
        let record = self
            .get(key)
            .ok_or_else(|| AgramaError::not_found(key))?;
        Ok(record.history(limit))
    }

    /// Number of keys with records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All keys currently stored
    pub fn keys(&self) -> Vec<String> {
        self.records.iter().map(|r| r.key().clone()).collect()
    }

    /// Aggregate statistics
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            records: self.records.len(),
            writes: self.writes.load(Ordering::Relaxed),
            ..StoreStats::default()
        };
        for r in self.records.iter() {
            stats.versions += r.version_count();
            stats.resident_bytes += r.resident_bytes();
        }
        stats
    }

    /// Run a retention sweep across all keys
    pub fn apply_retention(&self, now: Timestamp) -> RetentionStats {
        let mut stats = RetentionStats::default();
        let keys: Vec<String> = self.keys();
        for key in keys {
            stats.keys_scanned += 1;
            if let Some(mut entry) = self.records.get_mut(&key) {
                let before = entry.version_count();
                let mut versions = entry.versions.clone();
                self.prune_versions(&mut versions, now);
                if versions.len() != before {
                    stats.entries_pruned += before - versions.len();
                    let (record_key, current, metadata) = {
                        let old = entry.value();
                        (old.key.clone(), old.current.clone(), old.metadata.clone())
                    };
                    *entry = Arc::new(TemporalRecord {
                        key: record_key,
                        current,
                        metadata,
                        versions,
                    });
                }
            }
        }
        stats
    }

    /// Serialize every record for the opaque persistence hook
    pub fn export(&self) -> Vec<SerializedRecord> {
        let mut out: Vec<SerializedRecord> = self
            .records
            .iter()
            .map(|r| SerializedRecord::from_record(r.value()))
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Restore records from a serialized export, replacing current contents
    pub fn restore(&self, records: Vec<SerializedRecord>) -> AgramaResult<()> {
        self.records.clear();
        for ser in records {
            let record = ser.into_record()?;
            self.records.insert(record.key.clone(), Arc::new(record));
        }
        Ok(())
    }
}

/// Wire-safe form of one record (metadata carried as JSON text so the
/// snapshot codec stays non-self-describing)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializedRecord {
    /// Record key
    pub key: String,
    versions: Vec<SerializedVersion>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SerializedVersion {
    timestamp_micros: u64,
    metadata_json: String,
    payload: VersionPayload,
}

impl SerializedRecord {
    fn from_record(record: &TemporalRecord) -> Self {
        SerializedRecord {
            key: record.key.clone(),
            versions: record
                .versions
                .iter()
                .map(|v| SerializedVersion {
                    timestamp_micros: v.timestamp.as_micros(),
                    metadata_json: serde_json::to_string(&v.metadata).unwrap_or_default(),
                    payload: v.payload.clone(),
                })
                .collect(),
        }
    }

    fn into_record(self) -> AgramaResult<TemporalRecord> {
        let mut versions = Vec::with_capacity(self.versions.len());
        for v in self.versions {
            versions.push(VersionEntry {
                timestamp: Timestamp(v.timestamp_micros),
                metadata: serde_json::from_str(&v.metadata_json).unwrap_or_default(),
                payload: v.payload,
            });
        }
        // Rebuild the denormalized current value from the version chain
        let mut previous: Vec<u8> = Vec::new();
        for entry in &versions {
            previous = match &entry.payload {
                VersionPayload::Anchor(v) => v.as_bytes().to_vec(),
                VersionPayload::Delta(ops) => apply_delta(&previous, ops),
            };
        }
        let metadata = versions
            .last()
            .map(|v| v.metadata.clone())
            .unwrap_or_default();
        Ok(TemporalRecord {
            key: self.key,
            current: Value::new(previous),
            metadata,
            versions,
        })
    }
}

/// Encode `new` as copy/insert ops against `old`
fn encode_delta(old: &[u8], new: &[u8]) -> Vec<DeltaOp> {
    let ops = capture_diff_slices(Algorithm::Myers, old, new);
    let mut delta = Vec::with_capacity(ops.len());
    for op in ops {
        match op {
            DiffOp::Equal {
                old_index, len, ..
            } => delta.push(DeltaOp::Copy {
                start: old_index as u32,
                len: len as u32,
            }),
            DiffOp::Insert {
                new_index, new_len, ..
            } => delta.push(DeltaOp::Insert(new[new_index..new_index + new_len].to_vec())),
            DiffOp::Replace {
                new_index, new_len, ..
            } => delta.push(DeltaOp::Insert(new[new_index..new_index + new_len].to_vec())),
            DiffOp::Delete { .. } => {}
        }
    }
    delta
}

/// Apply copy/insert ops to a previous version
fn apply_delta(previous: &[u8], ops: &[DeltaOp]) -> Vec<u8> {
    let mut out = Vec::with_capacity(previous.len());
    for op in ops {
        match op {
            DeltaOp::Copy { start, len } => {
                let start = *start as usize;
                let end = (start + *len as usize).min(previous.len());
                if start < previous.len() {
                    out.extend_from_slice(&previous[start..end]);
                }
            }
            DeltaOp::Insert(bytes) => out.extend_from_slice(bytes),
        }
    }
    out
}
