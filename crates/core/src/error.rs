//! Error types for the Agrama engine
//!
//! `AgramaError` is the unified error type for all Agrama APIs. It provides
//! consistent error handling across the temporal store, the indices, the
//! primitive engine, and the collaboration layer.
//!
//! ## Error Categories
//!
//! - **Validation**: bad input shape, oversize values, path escapes, invalid
//!   weights. Surfaced to the caller, never logged at error severity.
//! - **Not Found**: missing key, graph node, document, or agent session.
//! - **Resource**: pool exhaustion, connection cap, rate limit.
//! - **Consistency**: CRDT causality buffer overflow or index/store
//!   divergence. Fatal to the affected document only.
//! - **Deadline**: cooperative cancellation hit a checkpoint.
//! - **Internal**: an invariant violation. Logged at error severity and
//!   returned as a generic internal error without leaking internals.
//!
//! ## Usage
//!
//! ```ignore
//! match result {
//!     Err(e) if e.is_validation() => reject_request(e),
//!     Err(e) if e.is_serious() => log_and_alert(e),
//!     Err(e) => respond(e.json_rpc_code(), e.to_string()),
//!     Ok(value) => respond_ok(value),
//! }
//! ```

use thiserror::Error;

/// Result type alias for Agrama operations
pub type AgramaResult<T> = std::result::Result<T, AgramaError>;

/// Unified error type for all Agrama operations
#[derive(Debug, Error)]
pub enum AgramaError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Key failed validation (empty, oversize, traversal, NUL, escape)
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The offending key (truncated for display)
        key: String,
        /// Why the key was rejected
        reason: String,
    },

    /// Value exceeds the configured size limit
    #[error("value too large: {actual} bytes exceeds maximum {max}")]
    ValueTooLarge {
        /// Actual value size in bytes
        actual: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// A primitive parameter failed schema validation
    #[error("validation failed on field '{field}': {reason}")]
    ValidationFailed {
        /// The parameter that failed
        field: String,
        /// Why it failed
        reason: String,
    },

    /// Hybrid query weights are unusable (negative, or sum to zero)
    #[error("invalid weights: {reason}")]
    InvalidWeights {
        /// Why the weights were rejected
        reason: String,
    },

    /// Embedding dimension does not match the index dimension
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension the index was built with
        expected: usize,
        /// Dimension provided by the caller
        got: usize,
    },

    /// An index cannot serve queries yet (no vectors, unsupported dimension)
    #[error("index not ready: {reason}")]
    IndexNotReady {
        /// Why the index is unavailable
        reason: String,
    },

    // =========================================================================
    // Not Found Errors
    // =========================================================================
    /// Key has no record in the temporal store
    #[error("not found: {key}")]
    NotFound {
        /// The missing key
        key: String,
    },

    /// Graph traversal source is not a known node
    #[error("node missing from graph: {key}")]
    NodeMissing {
        /// The missing node key
        key: String,
    },

    /// Collaborative document does not exist
    #[error("document not found: {key}")]
    DocumentNotFound {
        /// The missing document key
        key: String,
    },

    /// Agent has no registered session
    #[error("unknown agent: {agent_id}")]
    UnknownAgent {
        /// The unregistered agent identifier
        agent_id: String,
    },

    /// Primitive name is not in the registry
    #[error("unknown primitive: {name}")]
    UnknownPrimitive {
        /// The unrecognized primitive name
        name: String,
    },

    /// Transform operation is not in the registry
    #[error("unknown transform operation: {name}")]
    UnknownTransform {
        /// The unrecognized operation name
        name: String,
    },

    // =========================================================================
    // Resource Errors
    // =========================================================================
    /// A fixed resource limit was exceeded
    #[error("capacity exceeded: {resource} (limit: {limit}, requested: {requested})")]
    CapacityExceeded {
        /// What resource was exceeded
        resource: String,
        /// The limit
        limit: usize,
        /// What was requested
        requested: usize,
    },

    /// Per-peer session creation rate limit hit
    #[error("rate limited: peer {peer}")]
    RateLimited {
        /// Hashed peer identity
        peer: String,
    },

    // =========================================================================
    // Deadline
    // =========================================================================
    /// Cooperative cancellation observed an expired deadline
    #[error("deadline exceeded during {operation} after {elapsed_ms}ms")]
    DeadlineExceeded {
        /// Operation that was cancelled
        operation: String,
        /// Elapsed time when the checkpoint fired
        elapsed_ms: u64,
    },

    // =========================================================================
    // Consistency Errors
    // =========================================================================
    /// Causal dependency buffer overflowed its cap
    #[error("causality violation on document {document}: {buffered} operations buffered")]
    CausalityViolation {
        /// Affected document key
        document: String,
        /// Number of operations stuck in the buffer
        buffered: usize,
    },

    /// Index/store divergence detected. Fatal to the affected entity only.
    #[error("consistency violation: {message}")]
    Consistency {
        /// Description of the divergence
        message: String,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Serialization failure (snapshots, protocol payloads)
    #[error("serialization error: {message}")]
    Serialization {
        /// What went wrong
        message: String,
    },

    /// Unexpected internal state. Indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message (not exposed on the wire)
        message: String,
    },
}

impl AgramaError {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create an InvalidKey error, truncating long keys for display
    pub fn invalid_key(key: impl AsRef<str>, reason: impl Into<String>) -> Self {
        let key = key.as_ref();
        let display: String = key.chars().take(64).collect();
        AgramaError::InvalidKey {
            key: display,
            reason: reason.into(),
        }
    }

    /// Create a ValueTooLarge error
    pub fn value_too_large(actual: usize, max: usize) -> Self {
        AgramaError::ValueTooLarge { actual, max }
    }

    /// Create a ValidationFailed error
    ///
    /// ```ignore
    /// AgramaError::validation("mode", "expected one of lexical|semantic|graph|temporal|hybrid")
    /// ```
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AgramaError::ValidationFailed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidWeights error
    pub fn invalid_weights(reason: impl Into<String>) -> Self {
        AgramaError::InvalidWeights {
            reason: reason.into(),
        }
    }

    /// Create a DimensionMismatch error
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        AgramaError::DimensionMismatch { expected, got }
    }

    /// Create a NotFound error
    pub fn not_found(key: impl Into<String>) -> Self {
        AgramaError::NotFound { key: key.into() }
    }

    /// Create a NodeMissing error
    pub fn node_missing(key: impl Into<String>) -> Self {
        AgramaError::NodeMissing { key: key.into() }
    }

    /// Create a DocumentNotFound error
    pub fn document_not_found(key: impl Into<String>) -> Self {
        AgramaError::DocumentNotFound { key: key.into() }
    }

    /// Create an UnknownAgent error
    pub fn unknown_agent(agent_id: impl Into<String>) -> Self {
        AgramaError::UnknownAgent {
            agent_id: agent_id.into(),
        }
    }

    /// Create an UnknownPrimitive error
    pub fn unknown_primitive(name: impl Into<String>) -> Self {
        AgramaError::UnknownPrimitive { name: name.into() }
    }

    /// Create a CapacityExceeded error
    pub fn capacity_exceeded(resource: impl Into<String>, limit: usize, requested: usize) -> Self {
        AgramaError::CapacityExceeded {
            resource: resource.into(),
            limit,
            requested,
        }
    }

    /// Create a DeadlineExceeded error
    pub fn deadline_exceeded(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        AgramaError::DeadlineExceeded {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        AgramaError::Internal {
            message: message.into(),
        }
    }

    /// Create a Serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        AgramaError::Serialization {
            message: message.into(),
        }
    }

    /// Create a Consistency error
    pub fn consistency(message: impl Into<String>) -> Self {
        AgramaError::Consistency {
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification
    // =========================================================================

    /// Check if this is a validation error (bad input; fix the input, don't retry)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AgramaError::InvalidKey { .. }
                | AgramaError::ValueTooLarge { .. }
                | AgramaError::ValidationFailed { .. }
                | AgramaError::InvalidWeights { .. }
                | AgramaError::DimensionMismatch { .. }
                | AgramaError::IndexNotReady { .. }
                | AgramaError::UnknownTransform { .. }
        )
    }

    /// Check if this is a "not found" type error
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AgramaError::NotFound { .. }
                | AgramaError::NodeMissing { .. }
                | AgramaError::DocumentNotFound { .. }
                | AgramaError::UnknownAgent { .. }
        )
    }

    /// Check if this is a resource exhaustion error (operationally alertable)
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            AgramaError::CapacityExceeded { .. } | AgramaError::RateLimited { .. }
        )
    }

    /// Check if this is a deadline cancellation
    pub fn is_deadline(&self) -> bool {
        matches!(self, AgramaError::DeadlineExceeded { .. })
    }

    /// Check if this is a serious error (invariant violation or divergence).
    ///
    /// Serious errors are logged at error severity and investigated; every
    /// other category is surfaced to the caller without an error-level log.
    pub fn is_serious(&self) -> bool {
        matches!(
            self,
            AgramaError::Internal { .. }
                | AgramaError::Consistency { .. }
                | AgramaError::CausalityViolation { .. }
        )
    }

    /// JSON-RPC error code for the wire envelope.
    ///
    /// `-32602` invalid params, `-32601` is reserved for unknown methods at
    /// the dispatcher, application codes in `[-32000, -32099]` for domain
    /// errors, `-32603` internal.
    pub fn json_rpc_code(&self) -> i64 {
        match self {
            e if e.is_validation() => -32602,
            AgramaError::UnknownPrimitive { .. } => -32000,
            e if e.is_not_found() => -32001,
            e if e.is_resource() => -32002,
            AgramaError::DeadlineExceeded { .. } => -32003,
            AgramaError::CausalityViolation { .. } | AgramaError::Consistency { .. } => -32004,
            _ => -32603,
        }
    }

    /// Message safe to place on the wire.
    ///
    /// Internal errors are collapsed to a generic string so invariant
    /// details never leak to callers.
    pub fn wire_message(&self) -> String {
        match self {
            AgramaError::Internal { .. } => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgramaError {
    fn from(e: serde_json::Error) -> Self {
        AgramaError::Serialization {
            message: format!("JSON error: {}", e),
        }
    }
}

impl From<bincode::Error> for AgramaError {
    fn from(e: bincode::Error) -> Self {
        AgramaError::Serialization {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_key_truncates_display() {
        let long = "k".repeat(500);
        let e = AgramaError::invalid_key(&long, "too long");
        match e {
            AgramaError::InvalidKey { key, .. } => assert_eq!(key.len(), 64),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_classification_validation() {
        assert!(AgramaError::invalid_key("../x", "traversal").is_validation());
        assert!(AgramaError::value_too_large(100, 50).is_validation());
        assert!(AgramaError::invalid_weights("sum is zero").is_validation());
        assert!(AgramaError::dimension_mismatch(256, 512).is_validation());
        assert!(!AgramaError::not_found("k").is_validation());
    }

    #[test]
    fn test_classification_not_found() {
        assert!(AgramaError::not_found("k").is_not_found());
        assert!(AgramaError::node_missing("n").is_not_found());
        assert!(AgramaError::document_not_found("d").is_not_found());
        assert!(AgramaError::unknown_agent("a").is_not_found());
        assert!(!AgramaError::internal("bug").is_not_found());
    }

    #[test]
    fn test_classification_serious() {
        assert!(AgramaError::internal("bug").is_serious());
        assert!(AgramaError::consistency("index divergence").is_serious());
        assert!(!AgramaError::not_found("k").is_serious());
        assert!(!AgramaError::value_too_large(2, 1).is_serious());
    }

    #[test]
    fn test_json_rpc_codes() {
        assert_eq!(AgramaError::invalid_weights("bad").json_rpc_code(), -32602);
        assert_eq!(AgramaError::unknown_primitive("x").json_rpc_code(), -32000);
        assert_eq!(AgramaError::not_found("k").json_rpc_code(), -32001);
        assert_eq!(
            AgramaError::capacity_exceeded("sessions", 100, 101).json_rpc_code(),
            -32002
        );
        assert_eq!(
            AgramaError::deadline_exceeded("search", 30_000).json_rpc_code(),
            -32003
        );
        assert_eq!(AgramaError::internal("bug").json_rpc_code(), -32603);
    }

    #[test]
    fn test_wire_message_hides_internal_detail() {
        let e = AgramaError::internal("entry point missing for node 17");
        assert_eq!(e.wire_message(), "internal error");
        let e = AgramaError::not_found("greet");
        assert!(e.wire_message().contains("greet"));
    }

    #[test]
    fn test_display_messages() {
        let e = AgramaError::value_too_large(51, 50);
        assert!(e.to_string().contains("51"));
        assert!(e.to_string().contains("50"));

        let e = AgramaError::validation("mode", "unsupported");
        assert!(e.to_string().contains("mode"));
        assert!(e.to_string().contains("unsupported"));
    }

    #[test]
    fn test_from_serde_json() {
        let bad: Result<serde_json::Value, _> = serde_json::from_str("{");
        let e: AgramaError = bad.unwrap_err().into();
        assert!(matches!(e, AgramaError::Serialization { .. }));
    }
}
