//! Keyed, cancelable one-shot timers.
//!
//! Each timer is a tokio task that sleeps until its deadline and then
//! posts a [`Fired`] message on a channel. The owner of the [`Timers`] map
//! receives those messages on its own task and calls [`Timers::claim`]
//! before acting, so timer tasks never touch state directly.
//!
//! `claim` removes the entry before the effect runs and rejects firings
//! that belong to a timer which has since been canceled or replaced. A
//! scheduled timer therefore takes effect at most once, and canceling an
//! already-fired or already-canceled timer is a no-op.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::tracing::prelude::*;

/// Deadline used when `now + delay` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Message posted by a timer task when its deadline passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<K> {
    pub key: K,
    id: u64,
}

#[derive(Debug)]
struct Entry {
    id: u64,
    deadline: Instant,
    abort: AbortHandle,
}

/// Map from key to at most one pending timer.
#[derive(Debug)]
pub struct Timers<K> {
    entries: HashMap<K, Entry>,
    next_id: u64,
    fired_tx: mpsc::UnboundedSender<Fired<K>>,
}

impl<K> Timers<K>
where
    K: Clone + Debug + Eq + Hash + Send + 'static,
{
    /// Create an empty timer map and the channel its firings arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fired<K>>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let timers = Self {
            entries: HashMap::new(),
            next_id: 0,
            fired_tx,
        };
        (timers, fired_rx)
    }

    /// Arm a timer for `key` that fires after `delay`.
    ///
    /// Replaces any timer already pending for `key`.
    pub fn schedule(&mut self, key: K, delay: Duration) {
        self.cancel(&key);

        let id = self.next_id;
        self.next_id += 1;

        let now = Instant::now();
        let deadline = now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE);
        let fired_tx = self.fired_tx.clone();
        let fired = Fired {
            key: key.clone(),
            id,
        };
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if fired_tx.send(fired).is_err() {
                trace!("Timer owner dropped before firing");
            }
        });

        self.entries.insert(
            key,
            Entry {
                id,
                deadline,
                abort: handle.abort_handle(),
            },
        );
    }

    /// Cancel the timer for `key`. Returns whether one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                entry.abort.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.abort.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Time left before `key` fires, if it is pending.
    pub fn remaining(&self, key: &K) -> Option<Duration> {
        self.entries
            .get(key)
            .map(|entry| entry.deadline.saturating_duration_since(Instant::now()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accept a firing and remove its entry.
    ///
    /// Returns `false` for stale firings: the timer was canceled or
    /// replaced after its task had already posted the message.
    pub fn claim(&mut self, fired: &Fired<K>) -> bool {
        match self.entries.get(&fired.key) {
            Some(entry) if entry.id == fired.id => {
                self.entries.remove(&fired.key);
                true
            }
            _ => {
                trace!(key = ?fired.key, "Discarding stale timer firing");
                false
            }
        }
    }
}

impl<K> Drop for Timers<K> {
    fn drop(&mut self) {
        for entry in self.entries.values() {
            entry.abort.abort();
        }
    }
}
