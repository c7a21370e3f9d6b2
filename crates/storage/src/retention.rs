//! History retention policy
//!
//! History is bounded per key by entry count and optionally by age. The
//! policy decides how many of the oldest entries to drop; the store performs
//! the drop at an anchor-safe boundary.

use agrama_core::Timestamp;
use serde::{Deserialize, Serialize};

/// Per-key history retention policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Maximum versions retained per key
    pub max_entries: usize,
    /// Maximum age in seconds; 0 disables age pruning
    pub max_age_secs: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy {
            max_entries: 64,
            max_age_secs: 0,
        }
    }
}

impl RetentionPolicy {
    /// How many of the oldest entries should be dropped.
    ///
    /// `timestamps` is oldest-first. The newest entry is never dropped.
    pub fn prune_count(&self, timestamps: &[Timestamp], now: Timestamp) -> usize {
        if timestamps.is_empty() {
            return 0;
        }
        let mut drop = timestamps.len().saturating_sub(self.max_entries.max(1));

        if self.max_age_secs > 0 {
            let cutoff = now
                .as_micros()
                .saturating_sub(self.max_age_secs.saturating_mul(1_000_000));
            let expired = timestamps
                .iter()
                .take(timestamps.len() - 1)
                .take_while(|t| t.as_micros() < cutoff)
                .count();
            drop = drop.max(expired);
        }

        drop.min(timestamps.len() - 1)
    }
}

/// Counters returned by a retention sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetentionStats {
    /// Keys visited
    pub keys_scanned: usize,
    /// History entries dropped
    pub entries_pruned: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn test_count_pruning() {
        let policy = RetentionPolicy {
            max_entries: 3,
            max_age_secs: 0,
        };
        let stamps: Vec<_> = (0..5).map(ts).collect();
        assert_eq!(policy.prune_count(&stamps, ts(100)), 2);
    }

    #[test]
    fn test_age_pruning() {
        let policy = RetentionPolicy {
            max_entries: 100,
            max_age_secs: 10,
        };
        let stamps = vec![ts(1), ts(2), ts(50), ts(60)];
        // At t=61, entries older than t=51 expire
        assert_eq!(policy.prune_count(&stamps, ts(61)), 2);
    }

    #[test]
    fn test_newest_entry_survives() {
        let policy = RetentionPolicy {
            max_entries: 1,
            max_age_secs: 1,
        };
        let stamps = vec![ts(1), ts(2)];
        // Everything is ancient at t=1000 but the newest entry stays
        assert_eq!(policy.prune_count(&stamps, ts(1000)), 1);
    }

    #[test]
    fn test_no_pruning_under_limits() {
        let policy = RetentionPolicy::default();
        let stamps = vec![ts(1), ts(2), ts(3)];
        assert_eq!(policy.prune_count(&stamps, ts(10)), 0);
    }

    #[test]
    fn test_empty_history() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.prune_count(&[], ts(10)), 0);
    }
}
