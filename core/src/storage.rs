//! Outcome bookkeeping shared between a circuit breaker and its state machine
//!
//! The store is reachable from the state machine context so transition guards
//! can read the consecutive failure count. Every mutation happens while the
//! owning breaker holds its lock; the atomics only make the store `Sync`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Sentinel for "no failure recorded yet"
const NEVER: u64 = u64::MAX;

/// Consecutive-failure tracking with a monotonic clock
#[derive(Debug)]
pub struct OutcomeStore {
    /// Consecutive failures in the current state
    failures: AtomicUsize,
    /// Microseconds since `start_time` of the most recent failure
    last_failure_us: AtomicU64,
    /// Monotonic time anchor (immune to wall-clock adjustments)
    start_time: Instant,
}

impl OutcomeStore {
    pub fn new() -> Self {
        Self {
            failures: AtomicUsize::new(0),
            last_failure_us: AtomicU64::new(NEVER),
            start_time: Instant::now(),
        }
    }

    /// Record a failure, returning the new consecutive count
    pub fn record_failure(&self) -> usize {
        self.last_failure_us
            .store(micros(self.start_time.elapsed()), Ordering::Release);
        self.failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Reset the consecutive failure count (success while closed, or a state change)
    pub fn reset_failures(&self) {
        self.failures.store(0, Ordering::Release);
    }

    pub fn failure_count(&self) -> usize {
        self.failures.load(Ordering::Acquire)
    }

    /// Time elapsed since the last recorded failure, if any
    pub fn since_last_failure(&self) -> Option<Duration> {
        match self.last_failure_us.load(Ordering::Acquire) {
            NEVER => None,
            at => Some(self.start_time.elapsed().saturating_sub(Duration::from_micros(at))),
        }
    }

    /// Forget everything, including the last failure time
    pub fn clear(&self) {
        self.failures.store(0, Ordering::Release);
        self.last_failure_us.store(NEVER, Ordering::Release);
    }

    /// Monotonic time in seconds since the store was created
    pub fn monotonic_time(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

impl Default for OutcomeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Saturating conversion; a process would need to run ~584k years to overflow
fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(NEVER - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_reset_failures() {
        let store = OutcomeStore::new();

        assert_eq!(store.record_failure(), 1);
        assert_eq!(store.record_failure(), 2);
        assert_eq!(store.failure_count(), 2);

        store.reset_failures();
        assert_eq!(store.failure_count(), 0);
        // Reset keeps the last failure time for diagnostics
        assert!(store.since_last_failure().is_some());
    }

    #[test]
    fn test_no_failure_recorded() {
        let store = OutcomeStore::new();
        assert!(store.since_last_failure().is_none());
    }

    #[test]
    fn test_clear_forgets_last_failure() {
        let store = OutcomeStore::new();
        store.record_failure();
        store.clear();

        assert_eq!(store.failure_count(), 0);
        assert!(store.since_last_failure().is_none());
    }

    #[test]
    fn test_since_last_failure_grows() {
        let store = OutcomeStore::new();
        store.record_failure();
        let first = store.since_last_failure().unwrap();

        std::thread::sleep(Duration::from_millis(10));

        let second = store.since_last_failure().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_monotonic_time() {
        let store = OutcomeStore::new();
        let time1 = store.monotonic_time();
        std::thread::sleep(Duration::from_millis(10));
        let time2 = store.monotonic_time();

        assert!(time2 > time1);
    }
}
