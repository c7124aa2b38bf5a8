//! A rate gate that admits one request per cooldown interval.
//!
//! Used to keep alert sounds from stacking up during a burst of alerts
//! while the notifications themselves still go through.
//!
//! # State Machine
//!
//! ```text
//!            try_acquire()                 elapsed >= interval
//!  Ready ─────────────────► Cooling ──────────────────────────► Ready
//!    ▲       (Acquired)        │ ▲
//!    │                         │ │ try_acquire() while elapsed < interval
//!    │                         └─┘ (Suppressed, timer not extended)
//!    │                         │
//!    └──────── reset() ────────┘
//! ```
//!
//! - **Ready:** Nothing admitted recently. The next request is admitted.
//! - **Cooling:** A request was admitted at `since`. Requests are dropped
//!   until `interval` has elapsed from that instant. Dropped requests do
//!   not restart the window.

use std::time::Duration;

use tokio::time::Instant;

/// Result of [`Cooldown::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownStatus {
    /// Request admitted; the cooldown window starts now.
    Acquired,

    /// Request dropped; `remaining` is left on the current window.
    Suppressed { remaining: Duration },
}

impl CooldownStatus {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

#[derive(Debug)]
enum State {
    Ready,
    Cooling(Instant),
}

/// Admits at most one request per `interval`.
#[derive(Debug)]
pub struct Cooldown {
    interval: Duration,
    state: State,
}

impl Cooldown {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: State::Ready,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ask to pass the gate.
    ///
    /// | State | elapsed | Result |
    /// |-------|---------|--------|
    /// | Ready | - | `Acquired` (starts window) |
    /// | Cooling | `< interval` | `Suppressed` |
    /// | Cooling | `>= interval` | `Acquired` (restarts window) |
    pub fn try_acquire(&mut self) -> CooldownStatus {
        let now = Instant::now();
        match self.state {
            State::Cooling(since) if now.duration_since(since) < self.interval => {
                CooldownStatus::Suppressed {
                    remaining: self.interval - now.duration_since(since),
                }
            }
            State::Ready | State::Cooling(_) => {
                self.state = State::Cooling(now);
                CooldownStatus::Acquired
            }
        }
    }

    /// Drop any running window so the next request is admitted.
    pub fn reset(&mut self) {
        self.state = State::Ready;
    }
}
