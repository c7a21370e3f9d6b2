//! Values and metadata
//!
//! A value is an opaque byte sequence; the engine attaches no meaning to its
//! contents. Metadata is a small JSON-typed map. Three fields are always
//! injected by the engine and win over caller entries on collision:
//! `agent_id`, `timestamp`, `session_id`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque byte value stored under a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Value(pub Vec<u8>);

impl Value {
    /// Wrap raw bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Value(bytes.into())
    }

    /// Byte length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the value is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// View as UTF-8 text when valid
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value(s.into_bytes())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value(b)
    }
}

/// JSON-typed metadata attached to a record
///
/// BTreeMap keeps serialization deterministic.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata field names the engine owns
pub mod engine_fields {
    /// Identifier of the agent that performed the write
    pub const AGENT_ID: &str = "agent_id";
    /// Unix-seconds timestamp of the write
    pub const TIMESTAMP: &str = "timestamp";
    /// Session the write was issued under
    pub const SESSION_ID: &str = "session_id";
}

/// Merge caller metadata underneath the engine-injected fields.
///
/// Caller entries survive unless they collide with an engine field.
pub fn merge_metadata(
    caller: Option<Metadata>,
    agent_id: &str,
    timestamp_secs: u64,
    session_id: &str,
) -> Metadata {
    let mut merged = caller.unwrap_or_default();
    merged.insert(
        engine_fields::AGENT_ID.to_string(),
        serde_json::Value::String(agent_id.to_string()),
    );
    merged.insert(
        engine_fields::TIMESTAMP.to_string(),
        serde_json::Value::from(timestamp_secs),
    );
    merged.insert(
        engine_fields::SESSION_ID.to_string(),
        serde_json::Value::String(session_id.to_string()),
    );
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_text_view() {
        let v = Value::from("hello");
        assert_eq!(v.as_text(), Some("hello"));
        assert_eq!(v.len(), 5);

        let v = Value::new(vec![0xff, 0xfe]);
        assert_eq!(v.as_text(), None);
    }

    #[test]
    fn test_merge_metadata_injects_engine_fields() {
        let merged = merge_metadata(None, "agent-1", 1700000000, "sess-9");
        assert_eq!(merged["agent_id"], serde_json::json!("agent-1"));
        assert_eq!(merged["timestamp"], serde_json::json!(1700000000u64));
        assert_eq!(merged["session_id"], serde_json::json!("sess-9"));
    }

    #[test]
    fn test_merge_metadata_engine_fields_win() {
        let mut caller = Metadata::new();
        caller.insert("agent_id".into(), serde_json::json!("spoofed"));
        caller.insert("purpose".into(), serde_json::json!("notes"));

        let merged = merge_metadata(Some(caller), "real-agent", 42, "s");
        assert_eq!(merged["agent_id"], serde_json::json!("real-agent"));
        assert_eq!(merged["purpose"], serde_json::json!("notes"));
    }
}
