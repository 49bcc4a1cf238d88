//! Clock trait for deterministic timing in tests.
//!
//! The expiration countdown compares a server-issued deadline against the
//! current wall clock. Production code uses `SystemClock`; tests use
//! `MockClock`, which returns a value the test controls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Trait for reading the current time as Unix epoch seconds.
pub trait Clock: Send + Sync {
    /// Current time in whole seconds since the Unix epoch.
    fn now_epoch(&self) -> u64;
}

/// Production clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Mock clock for testing that returns a settable epoch value.
#[derive(Debug, Default)]
pub struct MockClock {
    epoch: AtomicU64,
}

impl MockClock {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch: AtomicU64::new(epoch),
        }
    }

    /// Replace the reported epoch.
    pub fn set(&self, epoch: u64) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    /// Move the reported epoch forward.
    pub fn advance(&self, seconds: u64) {
        self.epoch.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_past_2020() {
        let clock = SystemClock;
        assert!(clock.now_epoch() > 1_577_836_800);
    }

    #[test]
    fn test_mock_clock_returns_set_value() {
        let clock = MockClock::new(1_000);
        assert_eq!(clock.now_epoch(), 1_000);

        clock.set(2_000);
        assert_eq!(clock.now_epoch(), 2_000);
    }

    #[test]
    fn test_mock_clock_advance() {
        let clock = MockClock::new(100);
        clock.advance(90);
        assert_eq!(clock.now_epoch(), 190);
    }
}
