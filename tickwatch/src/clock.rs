//! Wall-clock source for the engine and registry.
//!
//! Deadlines themselves run on tokio's monotonic clock (see
//! [`crate::timer`]); the wall clock is only consulted for timestamps and
//! for computing how far away a time-of-day is.

use std::time::Duration;

use time::{OffsetDateTime, UtcOffset};
use tokio::time::Instant;

/// Source of "now" in local wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    /// Local UTC offset in force at `at`.
    ///
    /// Defaults to the offset `at` already carries.
    fn offset_at(&self, at: OffsetDateTime) -> UtcOffset {
        at.offset()
    }

    /// Monotonic delay until `target`, zero if it has already passed.
    fn until(&self, target: OffsetDateTime) -> Duration {
        let diff = target - self.now();
        if diff.is_positive() {
            diff.unsigned_abs()
        } else {
            Duration::ZERO
        }
    }
}

/// The host clock, in the local UTC offset when it can be determined.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
    }

    fn offset_at(&self, at: OffsetDateTime) -> UtcOffset {
        UtcOffset::local_offset_at(at).unwrap_or(at.offset())
    }
}

/// A wall clock that advances with tokio's clock from a fixed origin.
///
/// Under a paused runtime, `tokio::time::advance` moves this clock by the
/// same amount, which keeps wall-clock and monotonic deadlines in step.
#[derive(Debug, Clone)]
pub struct AnchoredClock {
    origin: OffsetDateTime,
    anchor: Instant,
}

impl AnchoredClock {
    pub fn new(origin: OffsetDateTime) -> Self {
        Self {
            origin,
            anchor: Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> OffsetDateTime {
        self.origin + self.anchor.elapsed()
    }
}
