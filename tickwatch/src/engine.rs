//! Alert lifecycle engine.
//!
//! Decides, per inbound alert, whether a symbol becomes visible, resurfaces,
//! or is suppressed, and manages the hide/cooldown/forget lifecycle.
//!
//! # Symbol lifecycle
//!
//! ```text
//!                 alert                     hide()
//!   Unknown ─────────────────► Visible ─────────────────► Hidden
//!      ▲                        │  ▲                        │  │
//!      │            dismiss()   │  │ high-priority alert    │  │ reveal()
//!      │                        ▼  │                        │  ▼
//!      │                      Known (not visible) ◄─────────┼──┘
//!      │                                                    │
//!      └──────────────── purge timer fires ─────────────────┘
//! ```
//!
//! - **Visible:** in the received set with a record in the visible list.
//! - **Known:** in the received set, no record (dismissed, or revealed
//!   after a hide). Low-priority repeats are duplicates.
//! - **Hidden:** in the received set with a pending purge. Every alert is
//!   suppressed until the purge fires or the symbol is revealed.
//!
//! `clear_all()` returns every symbol to Unknown.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::clock::Clock;
use crate::store::PersistQueue;
use crate::suppression::Suppressions;
use crate::timer::{Fired, Timers};
use crate::tracing::prelude::*;
use crate::types::{AlertEvent, AlertRecord, Direction, Symbol};

/// Why an alert did not surface.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SuppressReason {
    /// Symbol is on the ignore list.
    Ignored,
    /// Symbol is snoozed and the alert was not high priority.
    Snoozed,
    /// Symbol was hidden and its cooldown has not elapsed.
    Cooldown,
    /// Symbol is already known and the alert was not high priority.
    Duplicate,
}

/// Result of [`AlertEngine::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Suppressed(SuppressReason),
    Surfaced { record: AlertRecord, was_new: bool },
}

impl Outcome {
    pub fn is_surfaced(&self) -> bool {
        matches!(self, Outcome::Surfaced { .. })
    }
}

/// Owner of the received set, the visible list and pending purges.
pub struct AlertEngine {
    hiding_timeout: Duration,
    received: HashSet<Symbol>,
    /// Most recently surfaced first.
    visible: VecDeque<AlertRecord>,
    purges: Timers<Symbol>,
    clock: Arc<dyn Clock>,
    persist: PersistQueue,
    visible_tx: watch::Sender<Vec<AlertRecord>>,
}

impl AlertEngine {
    /// Build an engine around the visible list restored from storage.
    ///
    /// Restored symbols count as received so a low-priority repeat does not
    /// create a second record for them. Must be called from within a tokio
    /// runtime; purge firings arrive on the returned receiver and must be
    /// passed back to [`on_purge`](Self::on_purge).
    pub fn new(
        hiding_timeout: Duration,
        restored: Vec<AlertRecord>,
        clock: Arc<dyn Clock>,
        persist: PersistQueue,
    ) -> (Self, mpsc::UnboundedReceiver<Fired<Symbol>>) {
        let mut received = HashSet::new();
        let visible: VecDeque<AlertRecord> = restored
            .into_iter()
            .filter(|record| received.insert(record.symbol.clone()))
            .collect();

        let (visible_tx, _) = watch::channel(visible.iter().cloned().collect());
        let (purges, fired_rx) = Timers::new();

        let engine = Self {
            hiding_timeout,
            received,
            visible,
            purges,
            clock,
            persist,
            visible_tx,
        };
        (engine, fired_rx)
    }

    /// Decide what an inbound alert does.
    ///
    /// Rules are checked in order; the first that applies wins:
    ///
    /// 1. ignored: suppressed
    /// 2. snoozed, low priority: suppressed
    /// 3. hidden (purge pending): suppressed, whatever the priority
    /// 4. known: low priority is a duplicate; high priority moves the
    ///    record to the front as unread (recreating it if dismissed)
    /// 5. unknown: new record at the front
    ///
    /// A surfacing high-priority alert also lifts a snooze on the symbol.
    pub fn handle(&mut self, event: &AlertEvent, suppressions: &mut dyn Suppressions) -> Outcome {
        let symbol = &event.symbol;
        let high = event.is_high_priority;

        let outcome = if suppressions.is_ignored(symbol) {
            Outcome::Suppressed(SuppressReason::Ignored)
        } else if !high && suppressions.is_snoozed(symbol) {
            Outcome::Suppressed(SuppressReason::Snoozed)
        } else if self.purges.is_pending(symbol) {
            Outcome::Suppressed(SuppressReason::Cooldown)
        } else if self.received.contains(symbol) {
            if high {
                let record = match self.take_visible(symbol) {
                    Some(mut record) => {
                        record.is_unread = true;
                        record
                    }
                    None => AlertRecord::new(symbol.clone(), self.clock.now()),
                };
                self.surface(record, false, suppressions)
            } else {
                Outcome::Suppressed(SuppressReason::Duplicate)
            }
        } else {
            self.received.insert(symbol.clone());
            let record = AlertRecord::new(symbol.clone(), self.clock.now());
            self.surface(record, true, suppressions)
        };

        match &outcome {
            Outcome::Suppressed(reason) => {
                debug!(symbol = %symbol, high_priority = high, reason = %reason, "Alert suppressed");
            }
            Outcome::Surfaced { was_new, .. } => {
                info!(symbol = %symbol, high_priority = high, was_new, "Alert surfaced");
            }
        }
        outcome
    }

    fn surface(
        &mut self,
        record: AlertRecord,
        was_new: bool,
        suppressions: &mut dyn Suppressions,
    ) -> Outcome {
        // Only high-priority alerts get past a snooze, so this is the
        // override path.
        suppressions.clear_snooze_for(&record.symbol);

        self.visible.push_front(record.clone());
        self.publish();
        Outcome::Surfaced { record, was_new }
    }

    /// Take a symbol out of view and forget it after the hiding timeout.
    ///
    /// Replaces any cooldown already running for the symbol. Hiding a
    /// symbol the engine has never received does nothing.
    pub fn hide(&mut self, symbol: &Symbol) -> bool {
        if !self.received.contains(symbol) {
            debug!(symbol = %symbol, "Hide for unknown symbol ignored");
            return false;
        }

        if self.take_visible(symbol).is_some() {
            self.publish();
        }
        self.purges.schedule(symbol.clone(), self.hiding_timeout);
        info!(
            symbol = %symbol,
            timeout_secs = self.hiding_timeout.as_secs(),
            "Alert hidden"
        );
        true
    }

    /// Cancel a hide cooldown. The symbol stays known and out of view.
    pub fn reveal(&mut self, symbol: &Symbol) -> bool {
        let canceled = self.purges.cancel(symbol);
        if canceled {
            info!(symbol = %symbol, "Hide cooldown canceled");
        }
        canceled
    }

    /// Remove a record from view. The symbol stays known.
    pub fn dismiss(&mut self, symbol: &Symbol) -> bool {
        let removed = self.take_visible(symbol).is_some();
        if removed {
            info!(symbol = %symbol, "Alert dismissed");
            self.publish();
        }
        removed
    }

    /// Forget everything: cooldowns, known symbols and the visible list.
    pub fn clear_all(&mut self) {
        info!(
            visible = self.visible.len(),
            received = self.received.len(),
            pending = self.purges.len(),
            "Clearing all alerts"
        );
        self.purges.cancel_all();
        self.received.clear();
        self.visible.clear();
        self.publish();
    }

    /// Handle a firing of a purge timer. Returns the forgotten symbol, or
    /// `None` for a stale firing.
    pub fn on_purge(&mut self, fired: &Fired<Symbol>) -> Option<Symbol> {
        if !self.purges.claim(fired) {
            return None;
        }
        self.received.remove(&fired.key);
        info!(symbol = %fired.key, "Hidden symbol forgotten");
        Some(fired.key.clone())
    }

    // ============ Record updates ============

    pub fn set_starred(&mut self, symbol: &Symbol, starred: bool) -> Option<AlertRecord> {
        self.update_record(symbol, |record| record.is_starred = starred)
    }

    pub fn set_unread(&mut self, symbol: &Symbol, unread: bool) -> Option<AlertRecord> {
        self.update_record(symbol, |record| record.is_unread = unread)
    }

    pub fn set_direction(&mut self, symbol: &Symbol, direction: Direction) -> Option<AlertRecord> {
        self.update_record(symbol, |record| record.direction = direction)
    }

    /// Mark every visible record read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for record in self.visible.iter_mut().filter(|r| r.is_unread) {
            record.is_unread = false;
            changed += 1;
        }
        if changed > 0 {
            self.publish();
        }
        changed
    }

    fn update_record(
        &mut self,
        symbol: &Symbol,
        update: impl FnOnce(&mut AlertRecord),
    ) -> Option<AlertRecord> {
        let record = self.visible.iter_mut().find(|r| &r.symbol == symbol)?;
        let before = record.clone();
        update(record);
        let after = record.clone();
        if after != before {
            self.publish();
        }
        Some(after)
    }

    // ============ Configuration & queries ============

    /// Applies to cooldowns started after the change.
    pub fn set_hiding_timeout(&mut self, timeout: Duration) {
        self.hiding_timeout = timeout;
    }

    pub fn hiding_timeout(&self) -> Duration {
        self.hiding_timeout
    }

    /// Visible records, most recently surfaced first.
    pub fn visible(&self) -> impl Iterator<Item = &AlertRecord> {
        self.visible.iter()
    }

    pub fn visible_record(&self, symbol: &Symbol) -> Option<&AlertRecord> {
        self.visible.iter().find(|r| &r.symbol == symbol)
    }

    pub fn is_known(&self, symbol: &Symbol) -> bool {
        self.received.contains(symbol)
    }

    pub fn is_pending_purge(&self, symbol: &Symbol) -> bool {
        self.purges.is_pending(symbol)
    }

    /// Time left on a symbol's hide cooldown.
    pub fn purge_remaining(&self, symbol: &Symbol) -> Option<Duration> {
        self.purges.remaining(symbol)
    }

    /// Snapshot of the visible list, updated after every change.
    pub fn subscribe_visible(&self) -> watch::Receiver<Vec<AlertRecord>> {
        self.visible_tx.subscribe()
    }

    fn take_visible(&mut self, symbol: &Symbol) -> Option<AlertRecord> {
        let index = self.visible.iter().position(|r| &r.symbol == symbol)?;
        self.visible.remove(index)
    }

    fn publish(&self) {
        let snapshot: Vec<AlertRecord> = self.visible.iter().cloned().collect();
        self.persist.save_visible_records(snapshot.clone());
        self.visible_tx.send_replace(snapshot);
    }
}
