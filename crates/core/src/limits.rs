//! Size and retention limits
//!
//! Configurable limits enforced by the engine and the dispatcher. Violations
//! surface as validation errors, never panics.

/// Engine-wide size limits
///
/// Custom limits can be set when the engine is constructed; the defaults are
/// the documented protocol limits.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum key length in bytes (default: 4096)
    pub max_key_bytes: usize,

    /// Maximum value size in bytes (default: 50 MiB)
    pub max_value_bytes: usize,

    /// Maximum wire message size in bytes, enforced before parse (default: 10 MiB)
    pub max_message_bytes: usize,

    /// Maximum history entries retained per key (default: 64)
    pub max_history_entries: usize,

    /// Maximum history age in seconds; 0 disables age pruning (default: 0)
    pub max_history_age_secs: u64,

    /// Minimum value length that triggers embedding generation (default: 50)
    pub embed_threshold_bytes: usize,

    /// Cap on buffered causally-unready CRDT operations per document (default: 1024)
    pub max_causal_buffer: usize,

    /// Cap on provenance records retained in memory (default: 65536)
    pub max_provenance_records: usize,

    /// Default primitive execution deadline in milliseconds (default: 30000)
    pub default_deadline_ms: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_bytes: 4096,
            max_value_bytes: 50 * 1024 * 1024,
            max_message_bytes: 10 * 1024 * 1024,
            max_history_entries: 64,
            max_history_age_secs: 0,
            embed_threshold_bytes: 50,
            max_causal_buffer: 1024,
            max_provenance_records: 65536,
            default_deadline_ms: 30_000,
        }
    }
}

impl Limits {
    /// Limits with small values for testing limit enforcement
    pub fn with_small_limits() -> Self {
        Limits {
            max_key_bytes: 64,
            max_value_bytes: 256,
            max_message_bytes: 512,
            max_history_entries: 4,
            max_history_age_secs: 0,
            embed_threshold_bytes: 8,
            max_causal_buffer: 4,
            max_provenance_records: 16,
            default_deadline_ms: 1_000,
        }
    }

    /// Validate a value size against `max_value_bytes`
    pub fn check_value_size(&self, len: usize) -> Result<(), (usize, usize)> {
        if len > self.max_value_bytes {
            Err((len, self.max_value_bytes))
        } else {
            Ok(())
        }
    }
}

/// Embedding dimensions the vector index accepts
pub const SUPPORTED_DIMENSIONS: [usize; 8] = [64, 128, 256, 512, 768, 1024, 1536, 3072];

/// Check whether a dimension is one of the supported sizes
pub fn is_supported_dimension(dim: usize) -> bool {
    SUPPORTED_DIMENSIONS.contains(&dim)
}
