//! Monotonic timestamp generation.
//!
//! Every operation the store performs is stamped by a [`TimeSequence`]. The
//! sequence reads a [`Clock`] but never hands out the same value twice, and
//! never goes backwards, even when the clock stalls or regresses. The issued
//! values therefore double as a total order over operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Nanoseconds since the Unix epoch.
pub type Timestamp = u64;

/// Source of wall-clock time for a [`TimeSequence`].
pub trait Clock: Send {
    /// Returns the current time in nanoseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        #[allow(clippy::cast_possible_truncation)] // Epoch nanos fit in u64 until year 2554
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64)
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so a test (or an embedding that replays
/// recorded data) can keep one handle and move the clock while the store
/// owns another. Setting an earlier time simulates clock regression.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a manual clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start)),
        }
    }

    /// Sets the current time. May move backwards.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the current time forward by `delta_ns`.
    pub fn advance(&self, delta_ns: u64) {
        self.now.fetch_add(delta_ns, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Generates strictly increasing timestamps.
pub struct TimeSequence {
    clock: Box<dyn Clock>,
    last: Timestamp,
}

impl TimeSequence {
    /// Creates a sequence over the given clock.
    pub fn new(clock: Box<dyn Clock>) -> Self {
        Self { clock, last: 0 }
    }

    /// Returns the next timestamp.
    ///
    /// This is the clock's reading when it is strictly after the last issued
    /// value, and the last issued value plus one nanosecond otherwise.
    /// Saturates at `u64::MAX`.
    pub fn next(&mut self) -> Timestamp {
        let now = self.clock.now();
        let out = if now > self.last {
            now
        } else {
            self.last.saturating_add(1)
        };
        self.last = out;
        out
    }

    /// Ensures future timestamps sort after `t`.
    ///
    /// Used when restoring persisted samples so that fresh writes never
    /// collide with, or sort before, historical ones.
    pub fn advance_to(&mut self, t: Timestamp) {
        if t > self.last {
            self.last = t.saturating_add(1);
        }
    }

    /// Returns the most recently issued timestamp (0 before the first call).
    pub fn last(&self) -> Timestamp {
        self.last
    }
}

impl Default for TimeSequence {
    fn default() -> Self {
        Self::new(Box::new(SystemClock))
    }
}

impl std::fmt::Debug for TimeSequence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeSequence")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_sequence_increases() {
        let mut seq = TimeSequence::default();
        let first = seq.next();
        let second = seq.next();
        assert!(second > first);
    }

    #[test]
    fn test_uses_clock_when_it_advances() {
        let clock = ManualClock::new(1_000);
        let mut seq = TimeSequence::new(Box::new(clock.clone()));

        assert_eq!(seq.next(), 1_000);
        clock.set(5_000);
        assert_eq!(seq.next(), 5_000);
    }

    #[test]
    fn test_stalled_clock_still_increases() {
        let clock = ManualClock::new(1_000);
        let mut seq = TimeSequence::new(Box::new(clock));

        assert_eq!(seq.next(), 1_000);
        assert_eq!(seq.next(), 1_001);
        assert_eq!(seq.next(), 1_002);
    }

    #[test]
    fn test_clock_regression() {
        let clock = ManualClock::new(10_000);
        let mut seq = TimeSequence::new(Box::new(clock.clone()));

        let mut issued = vec![seq.next()];
        for now in [9_000, 12_000, 3, 12_000, 12_001, 0] {
            clock.set(now);
            issued.push(seq.next());
        }

        for pair in issued.windows(2) {
            assert!(pair[1] > pair[0], "not increasing: {issued:?}");
        }
        assert_eq!(issued, vec![10_000, 10_001, 12_000, 12_001, 12_002, 12_003, 12_004]);
    }

    #[test]
    fn test_advance_to() {
        let clock = ManualClock::new(100);
        let mut seq = TimeSequence::new(Box::new(clock));

        seq.advance_to(5_000);
        assert_eq!(seq.last(), 5_001);
        assert_eq!(seq.next(), 5_002);

        // Going backwards is ignored.
        seq.advance_to(10);
        assert_eq!(seq.next(), 5_003);
    }

    #[test]
    fn test_saturates_at_max() {
        let clock = ManualClock::new(100);
        let mut seq = TimeSequence::new(Box::new(clock));

        seq.advance_to(u64::MAX);
        assert_eq!(seq.last(), u64::MAX);
        assert_eq!(seq.next(), u64::MAX);
    }
}
