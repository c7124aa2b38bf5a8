//! Ignore and snooze lists.
//!
//! The ignore list is permanent until the user edits it. The snooze list is
//! temporary: it is emptied by the user, by a high-priority alert for one
//! symbol, or automatically once a day at the configured clear time.
//!
//! If the service was not running when the clear time passed (laptop
//! closed over the boundary), the reset is caught up at startup using the
//! persisted `last_clear_at`.

use std::collections::BTreeSet;
use std::sync::Arc;

use time::{OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::store::{PersistQueue, SnoozeMetadata};
use crate::timer::{Fired, Timers};
use crate::tracing::prelude::*;
use crate::types::Symbol;

/// What the alert engine needs to know about suppression.
///
/// The engine only queries, plus the one command it issues when a
/// high-priority alert overrides a snooze.
pub trait Suppressions {
    fn is_ignored(&self, symbol: &Symbol) -> bool;
    fn is_snoozed(&self, symbol: &Symbol) -> bool;

    /// Remove one symbol from the snooze list. Returns whether it was there.
    fn clear_snooze_for(&mut self, symbol: &Symbol) -> bool;
}

/// Key of the single daily-clear timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DailyClear;

/// Persisted suppression state handed to the registry at startup.
#[derive(Debug, Clone, Default)]
pub struct SuppressionState {
    pub ignored: BTreeSet<Symbol>,
    pub snoozed: BTreeSet<Symbol>,
    pub metadata: SnoozeMetadata,
}

/// Owner of the ignore list, the snooze list and the daily reset.
pub struct SuppressionRegistry {
    ignored: BTreeSet<Symbol>,
    snoozed: BTreeSet<Symbol>,
    metadata: SnoozeMetadata,
    clear_time: Time,
    next_clear_at: Option<OffsetDateTime>,
    daily: Timers<DailyClear>,
    clock: Arc<dyn Clock>,
    persist: PersistQueue,
}

impl SuppressionRegistry {
    /// Build the registry, catch up a missed daily reset, and arm the
    /// timer for the next one.
    ///
    /// Must be called from within a tokio runtime. Firings of the daily
    /// timer arrive on the returned receiver and must be passed back to
    /// [`on_daily_clear`](Self::on_daily_clear).
    pub fn new(
        state: SuppressionState,
        clear_time: Time,
        clock: Arc<dyn Clock>,
        persist: PersistQueue,
    ) -> (Self, mpsc::UnboundedReceiver<Fired<DailyClear>>) {
        let (daily, fired_rx) = Timers::new();
        let mut registry = Self {
            ignored: state.ignored,
            snoozed: state.snoozed,
            metadata: state.metadata,
            clear_time,
            next_clear_at: None,
            daily,
            clock,
            persist,
        };

        registry.catch_up();
        let now = registry.clock.now();
        registry.schedule_next_clear(now);

        (registry, fired_rx)
    }

    // ============ Ignore list ============

    pub fn add_ignore(&mut self, symbol: Symbol) -> bool {
        let added = self.ignored.insert(symbol.clone());
        if added {
            info!(symbol = %symbol, "Ignoring symbol");
            self.persist.save_ignored(self.ignored.clone());
        }
        added
    }

    pub fn remove_ignore(&mut self, symbol: &Symbol) -> bool {
        let removed = self.ignored.remove(symbol);
        if removed {
            info!(symbol = %symbol, "No longer ignoring symbol");
            self.persist.save_ignored(self.ignored.clone());
        }
        removed
    }

    pub fn clear_ignore(&mut self) {
        if self.ignored.is_empty() {
            return;
        }
        info!(count = self.ignored.len(), "Clearing ignore list");
        self.ignored.clear();
        self.persist.save_ignored(BTreeSet::new());
    }

    pub fn ignored(&self) -> &BTreeSet<Symbol> {
        &self.ignored
    }

    // ============ Snooze list ============

    /// Add or remove a symbol from the snooze list. Returns whether the
    /// list changed.
    pub fn set_snoozed(&mut self, symbol: Symbol, snoozed: bool) -> bool {
        let changed = if snoozed {
            self.snoozed.insert(symbol.clone())
        } else {
            self.snoozed.remove(&symbol)
        };
        if changed {
            info!(symbol = %symbol, snoozed, "Snooze changed");
            self.persist.save_snoozed(self.snoozed.clone());
        }
        changed
    }

    /// Empty the snooze list at the user's request.
    ///
    /// Does not count as a daily reset; `last_clear_at` is untouched.
    pub fn clear_snooze(&mut self) {
        if self.snoozed.is_empty() {
            return;
        }
        info!(count = self.snoozed.len(), "Clearing snooze list");
        self.snoozed.clear();
        self.persist.save_snoozed(BTreeSet::new());
    }

    pub fn snoozed(&self) -> &BTreeSet<Symbol> {
        &self.snoozed
    }

    // ============ Daily reset ============

    pub fn clear_time(&self) -> Time {
        self.clear_time
    }

    /// When the daily timer is next due.
    pub fn next_clear_at(&self) -> Option<OffsetDateTime> {
        self.next_clear_at
    }

    pub fn last_clear_at(&self) -> Option<OffsetDateTime> {
        self.metadata.last_clear_at
    }

    /// Change the daily clear time and re-arm the timer.
    pub fn set_clear_time(&mut self, clear_time: Time) {
        if clear_time == self.clear_time {
            return;
        }
        info!(
            previous = %self.clear_time,
            clear_time = %clear_time,
            "Snooze clear time changed"
        );
        self.clear_time = clear_time;
        let now = self.clock.now();
        self.schedule_next_clear(now);
    }

    /// Handle a firing of the daily timer.
    ///
    /// Returns `false` (and does nothing) for a stale firing.
    pub fn on_daily_clear(&mut self, fired: &Fired<DailyClear>) -> bool {
        if !self.daily.claim(fired) {
            return false;
        }

        let now = self.clock.now();
        info!(count = self.snoozed.len(), "Daily snooze reset");
        self.reset_snoozed(now);

        // A timer can wake a hair before the wall-clock target; measuring
        // from the target keeps us from re-arming for the same instant.
        let after = match self.next_clear_at {
            Some(target) if target > now => target,
            _ => now,
        };
        self.schedule_next_clear(after);
        true
    }

    fn catch_up(&mut self) {
        let now = self.clock.now();
        let Some(last) = self.metadata.last_clear_at else {
            debug!("No previous snooze reset recorded; starting the clock now");
            self.metadata.last_clear_at = Some(now);
            self.persist.save_snooze_metadata(self.metadata.clone());
            return;
        };

        let due = next_occurrence(last, self.clear_time, |at| self.clock.offset_at(at));
        if now >= due {
            info!(
                last_clear_at = %last,
                missed = %due,
                count = self.snoozed.len(),
                "Catching up missed snooze reset"
            );
            self.reset_snoozed(now);
        }
    }

    fn reset_snoozed(&mut self, now: OffsetDateTime) {
        if !self.snoozed.is_empty() {
            self.snoozed.clear();
            self.persist.save_snoozed(BTreeSet::new());
        }
        self.metadata.last_clear_at = Some(now);
        self.persist.save_snooze_metadata(self.metadata.clone());
    }

    fn schedule_next_clear(&mut self, after: OffsetDateTime) {
        let next = next_occurrence(after, self.clear_time, |at| self.clock.offset_at(at));
        let delay = self.clock.until(next);
        debug!(next_clear_at = %next, delay_secs = delay.as_secs(), "Scheduled snooze reset");
        self.daily.schedule(DailyClear, delay);
        self.next_clear_at = Some(next);
    }
}

impl Suppressions for SuppressionRegistry {
    fn is_ignored(&self, symbol: &Symbol) -> bool {
        self.ignored.contains(symbol)
    }

    fn is_snoozed(&self, symbol: &Symbol) -> bool {
        self.snoozed.contains(symbol)
    }

    fn clear_snooze_for(&mut self, symbol: &Symbol) -> bool {
        let removed = self.snoozed.remove(symbol);
        if removed {
            info!(symbol = %symbol, "High-priority alert lifted snooze");
            self.persist.save_snoozed(self.snoozed.clone());
        }
        removed
    }
}

/// First instant strictly after `after` whose local time-of-day is `at`.
///
/// `offset_at` gives the local UTC offset in force at an instant. It is
/// consulted for every candidate day, so a clear time on the far side of a
/// daylight-saving change still lands on the local wall-clock time.
pub fn next_occurrence(
    after: OffsetDateTime,
    at: Time,
    offset_at: impl Fn(OffsetDateTime) -> UtcOffset,
) -> OffsetDateTime {
    let local_after = after.to_offset(offset_at(after));
    let mut date = local_after.date();
    loop {
        let wall = PrimitiveDateTime::new(date, at);
        let guess = wall.assume_offset(local_after.offset());
        let candidate = wall.assume_offset(offset_at(wall.assume_offset(offset_at(guess))));
        if candidate > after {
            return candidate;
        }
        match date.next_day() {
            Some(next) => date = next,
            None => return candidate,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::{datetime, offset, time};

    use super::*;
    use crate::clock::AnchoredClock;
    use crate::store::Write;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn registry_at(
        now: OffsetDateTime,
        state: SuppressionState,
        clear_time: Time,
    ) -> (
        SuppressionRegistry,
        mpsc::UnboundedReceiver<Fired<DailyClear>>,
        mpsc::UnboundedReceiver<Write>,
    ) {
        let (persist, writes) = PersistQueue::new();
        let clock = Arc::new(AnchoredClock::new(now));
        let (registry, fired_rx) = SuppressionRegistry::new(state, clear_time, clock, persist);
        (registry, fired_rx, writes)
    }

    fn snoozed_state(symbols: &[&str], last_clear_at: OffsetDateTime) -> SuppressionState {
        SuppressionState {
            snoozed: symbols.iter().map(|s| sym(s)).collect(),
            metadata: SnoozeMetadata {
                last_clear_at: Some(last_clear_at),
            },
            ..Default::default()
        }
    }

    fn drain(writes: &mut mpsc::UnboundedReceiver<Write>) -> Vec<Write> {
        let mut out = Vec::new();
        while let Ok(write) = writes.try_recv() {
            out.push(write);
        }
        out
    }

    fn fixed(at: OffsetDateTime) -> UtcOffset {
        at.offset()
    }

    /// US Eastern around the 2025 transitions.
    fn eastern(at: OffsetDateTime) -> UtcOffset {
        let summer = at >= datetime!(2025-03-09 07:00 UTC) && at < datetime!(2025-11-02 06:00 UTC);
        if summer {
            offset!(-4)
        } else {
            offset!(-5)
        }
    }

    /// Anchored wall clock that reports US Eastern offsets.
    struct EasternClock(AnchoredClock);

    impl Clock for EasternClock {
        fn now(&self) -> OffsetDateTime {
            self.0.now()
        }

        fn offset_at(&self, at: OffsetDateTime) -> UtcOffset {
            eastern(at)
        }
    }

    #[test]
    fn next_occurrence_later_today() {
        assert_eq!(
            next_occurrence(datetime!(2025-03-03 08:00 UTC), time!(09:00), fixed),
            datetime!(2025-03-03 09:00 UTC)
        );
    }

    #[test]
    fn next_occurrence_is_strictly_after() {
        assert_eq!(
            next_occurrence(datetime!(2025-03-03 09:00 UTC), time!(09:00), fixed),
            datetime!(2025-03-04 09:00 UTC)
        );
        assert_eq!(
            next_occurrence(datetime!(2025-03-03 23:30 UTC), time!(09:00), fixed),
            datetime!(2025-03-04 09:00 UTC)
        );
    }

    #[test]
    fn next_occurrence_keeps_offset() {
        assert_eq!(
            next_occurrence(datetime!(2025-03-03 08:00 -5), time!(09:00), fixed),
            datetime!(2025-03-03 09:00 -5)
        );
    }

    #[test]
    fn next_occurrence_follows_spring_forward() {
        assert_eq!(
            next_occurrence(datetime!(2025-03-08 09:00 -5), time!(09:00), eastern),
            datetime!(2025-03-09 09:00 -4)
        );
    }

    #[test]
    fn next_occurrence_follows_fall_back() {
        assert_eq!(
            next_occurrence(datetime!(2025-11-01 09:00 -4), time!(09:00), eastern),
            datetime!(2025-11-02 09:00 -5)
        );
    }

    #[test]
    fn next_occurrence_accepts_any_input_offset() {
        assert_eq!(
            next_occurrence(datetime!(2025-03-09 12:00 UTC), time!(09:00), eastern),
            datetime!(2025-03-09 09:00 -4)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn daily_reset_keeps_local_time_across_dst() {
        let (persist, _writes) = PersistQueue::new();
        let clock = Arc::new(EasternClock(AnchoredClock::new(datetime!(2025-03-08 12:00 -5))));
        let state = snoozed_state(&["NVDA"], datetime!(2025-03-08 09:00 -5));
        let (mut registry, mut fired_rx) =
            SuppressionRegistry::new(state, time!(09:00), clock, persist);

        assert_eq!(registry.next_clear_at(), Some(datetime!(2025-03-09 09:00 -4)));
        assert!(registry.is_snoozed(&sym("NVDA")));

        // 20 hours later is 09:00 EDT on the 9th, one hour earlier than a
        // fixed -5 offset would give.
        tokio::time::advance(Duration::from_secs(20 * 3600)).await;
        let fired = fired_rx.recv().await.unwrap();
        assert!(registry.on_daily_clear(&fired));
        assert!(!registry.is_snoozed(&sym("NVDA")));
        assert_eq!(registry.next_clear_at(), Some(datetime!(2025-03-10 09:00 -4)));
    }

    #[tokio::test(start_paused = true)]
    async fn ignore_list_write_through() {
        let (mut registry, _fired, mut writes) = registry_at(
            datetime!(2025-03-03 12:00 UTC),
            SuppressionState::default(),
            time!(09:00),
        );
        drain(&mut writes);

        assert!(registry.add_ignore(sym("TSLA")));
        assert!(!registry.add_ignore(sym("TSLA")));
        assert!(registry.is_ignored(&sym("TSLA")));
        assert_eq!(drain(&mut writes), vec![Write::Ignored([sym("TSLA")].into())]);

        assert!(registry.remove_ignore(&sym("TSLA")));
        assert!(!registry.remove_ignore(&sym("TSLA")));
        assert_eq!(drain(&mut writes), vec![Write::Ignored(BTreeSet::new())]);

        registry.add_ignore(sym("GME"));
        registry.clear_ignore();
        assert!(registry.ignored().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn snooze_toggle_and_override() {
        let (mut registry, _fired, mut writes) = registry_at(
            datetime!(2025-03-03 12:00 UTC),
            SuppressionState::default(),
            time!(09:00),
        );
        drain(&mut writes);

        assert!(registry.set_snoozed(sym("NVDA"), true));
        assert!(!registry.set_snoozed(sym("NVDA"), true));
        assert!(registry.is_snoozed(&sym("NVDA")));

        assert!(registry.clear_snooze_for(&sym("NVDA")));
        assert!(!registry.clear_snooze_for(&sym("NVDA")));
        assert!(!registry.is_snoozed(&sym("NVDA")));

        let writes = drain(&mut writes);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[1], Write::Snoozed(BTreeSet::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_clear_keeps_last_clear_at() {
        let last = datetime!(2025-03-03 09:00 UTC);
        let (mut registry, _fired, _writes) = registry_at(
            datetime!(2025-03-03 12:00 UTC),
            snoozed_state(&["AMD", "INTC"], last),
            time!(09:00),
        );

        registry.clear_snooze();
        assert!(registry.snoozed().is_empty());
        assert_eq!(registry.last_clear_at(), Some(last));
    }

    #[tokio::test(start_paused = true)]
    async fn startup_catches_up_missed_reset() {
        // Snoozed yesterday after the reset, app closed over this morning's.
        let (registry, _fired, mut writes) = registry_at(
            datetime!(2025-03-04 10:15 UTC),
            snoozed_state(&["NVDA"], datetime!(2025-03-03 09:00 UTC)),
            time!(09:00),
        );

        assert!(registry.snoozed().is_empty());
        assert_eq!(registry.last_clear_at(), Some(datetime!(2025-03-04 10:15 UTC)));
        assert_eq!(
            drain(&mut writes),
            vec![
                Write::Snoozed(BTreeSet::new()),
                Write::SnoozeMetadata(SnoozeMetadata {
                    last_clear_at: Some(datetime!(2025-03-04 10:15 UTC)),
                }),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn startup_without_missed_reset_keeps_snoozes() {
        let (registry, _fired, mut writes) = registry_at(
            datetime!(2025-03-04 08:59 UTC),
            snoozed_state(&["NVDA"], datetime!(2025-03-03 09:00 UTC)),
            time!(09:00),
        );

        assert!(registry.is_snoozed(&sym("NVDA")));
        assert!(drain(&mut writes).is_empty());
        assert_eq!(registry.next_clear_at(), Some(datetime!(2025-03-04 09:00 UTC)));
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_records_clock_without_clearing() {
        let state = SuppressionState {
            snoozed: [sym("AMD")].into(),
            ..Default::default()
        };
        let (registry, _fired, _writes) =
            registry_at(datetime!(2025-03-04 12:00 UTC), state, time!(09:00));

        assert!(registry.is_snoozed(&sym("AMD")));
        assert_eq!(registry.last_clear_at(), Some(datetime!(2025-03-04 12:00 UTC)));
    }

    #[tokio::test(start_paused = true)]
    async fn daily_timer_clears_and_rearms() {
        let (mut registry, mut fired_rx, _writes) = registry_at(
            datetime!(2025-03-04 08:59 UTC),
            snoozed_state(&["NVDA"], datetime!(2025-03-03 09:00 UTC)),
            time!(09:00),
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        let fired = fired_rx.recv().await.unwrap();
        assert!(registry.on_daily_clear(&fired));

        assert!(registry.snoozed().is_empty());
        assert_eq!(registry.last_clear_at(), Some(datetime!(2025-03-04 09:00 UTC)));
        assert_eq!(registry.next_clear_at(), Some(datetime!(2025-03-05 09:00 UTC)));

        // And the following day too.
        registry.set_snoozed(sym("AMD"), true);
        tokio::time::advance(Duration::from_secs(24 * 3600)).await;
        let fired = fired_rx.recv().await.unwrap();
        assert!(registry.on_daily_clear(&fired));
        assert!(registry.snoozed().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_time_change_reschedules() {
        let (mut registry, mut fired_rx, _writes) = registry_at(
            datetime!(2025-03-04 08:00 UTC),
            snoozed_state(&["NVDA"], datetime!(2025-03-03 09:00 UTC)),
            time!(09:00),
        );

        registry.set_clear_time(time!(08:30));
        assert_eq!(registry.next_clear_at(), Some(datetime!(2025-03-04 08:30 UTC)));

        tokio::time::advance(Duration::from_secs(30 * 60)).await;
        let fired = fired_rx.recv().await.unwrap();
        assert!(registry.on_daily_clear(&fired));
        assert!(registry.snoozed().is_empty());
        assert_eq!(registry.next_clear_at(), Some(datetime!(2025-03-05 08:30 UTC)));
    }

    #[tokio::test(start_paused = true)]
    async fn firing_from_replaced_schedule_is_ignored() {
        let (mut registry, mut fired_rx, _writes) = registry_at(
            datetime!(2025-03-04 08:59 UTC),
            snoozed_state(&["NVDA"], datetime!(2025-03-03 09:00 UTC)),
            time!(09:00),
        );

        tokio::time::advance(Duration::from_secs(60)).await;
        let stale = fired_rx.recv().await.unwrap();

        // Clear time moved before the firing was handled.
        registry.set_clear_time(time!(17:00));
        assert!(!registry.on_daily_clear(&stale));
        assert!(registry.is_snoozed(&sym("NVDA")));
    }
}
