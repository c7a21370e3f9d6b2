//! Timestamps and the degrading clock
//!
//! [`SafeTimer`] wraps the monotonic clock and falls back to coarse
//! wall-clock readings when the monotonic source misbehaves. Timer failure
//! is a recoverable condition here, never a panic.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Microsecond-precision wall-clock timestamp
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Current wall-clock time
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// Construct from Unix seconds
    pub fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1_000_000))
    }

    /// Microseconds since the Unix epoch
    pub fn as_micros(&self) -> u64 {
        self.0
    }

    /// Whole seconds since the Unix epoch
    pub fn as_secs(&self) -> u64 {
        self.0 / 1_000_000
    }

    /// Elapsed duration since an earlier timestamp, if ordered
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        self.0
            .checked_sub(earlier.0)
            .map(Duration::from_micros)
    }
}

/// High-resolution clock with graceful degradation
///
/// Reads are strictly monotonic per timer: if the high-resolution source
/// jumps backwards (or `Instant` arithmetic fails), the timer latches into
/// coarse mode and serves wall-clock readings clamped to the last value
/// handed out.
#[derive(Debug)]
pub struct SafeTimer {
    origin: Instant,
    origin_micros: u64,
    last: AtomicU64,
    degraded: AtomicBool,
}

impl Default for SafeTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl SafeTimer {
    /// Create a timer anchored at the current instant
    pub fn new() -> Self {
        SafeTimer {
            origin: Instant::now(),
            origin_micros: Timestamp::now().0,
            last: AtomicU64::new(0),
            degraded: AtomicBool::new(false),
        }
    }

    /// Current timestamp, monotonic for this timer
    pub fn now(&self) -> Timestamp {
        let raw = if self.degraded.load(Ordering::Relaxed) {
            Timestamp::now().0
        } else {
            match Instant::now().checked_duration_since(self.origin) {
                Some(elapsed) => self.origin_micros.saturating_add(elapsed.as_micros() as u64),
                None => {
                    self.degraded.store(true, Ordering::Relaxed);
                    Timestamp::now().0
                }
            }
        };

        // Clamp so callers never observe time moving backwards
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let clamped = raw.max(prev);
            match self
                .last
                .compare_exchange_weak(prev, clamped, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Timestamp(clamped),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Whether the timer has fallen back to coarse wall-clock readings
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

/// Deadline for a cooperative operation
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline expiring `budget` from now
    pub fn after(budget: Duration) -> Self {
        Deadline {
            start: Instant::now(),
            budget,
        }
    }

    /// A deadline that never expires (for tests and embedded callers)
    pub fn unbounded() -> Self {
        Deadline {
            start: Instant::now(),
            budget: Duration::from_secs(u64::MAX / 4),
        }
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.budget
    }

    /// Milliseconds elapsed since the deadline was armed
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip_secs() {
        let t = Timestamp::from_secs(1700000000);
        assert_eq!(t.as_secs(), 1700000000);
    }

    #[test]
    fn test_timestamp_duration_since() {
        let a = Timestamp(1_000);
        let b = Timestamp(4_000);
        assert_eq!(b.duration_since(a), Some(Duration::from_micros(3_000)));
        assert_eq!(a.duration_since(b), None);
    }

    #[test]
    fn test_safe_timer_monotonic() {
        let timer = SafeTimer::new();
        let mut prev = timer.now();
        for _ in 0..1000 {
            let next = timer.now();
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn test_safe_timer_not_degraded_by_default() {
        let timer = SafeTimer::new();
        let _ = timer.now();
        assert!(!timer.is_degraded());
    }

    #[test]
    fn test_deadline_expiry() {
        let d = Deadline::after(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(1));
        assert!(d.expired());

        let d = Deadline::unbounded();
        assert!(!d.expired());
    }
}
