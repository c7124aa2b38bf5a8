//! The service actor.
//!
//! One task owns the alert engine, the suppression registry and the
//! notification dispatcher. API handlers talk to it through
//! [`AlertCommand`]s; timer firings come back to it over their own
//! channels. Everything that touches engine or registry state therefore
//! runs on this one task, one message at a time.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::api::commands::{AlertCommand, ListKind, SettingsUpdate};
use crate::api_client::types::{AlertPatchRequest, AlertResponse, AlertView, ServiceEvent, Settings};
use crate::clock::Clock;
use crate::config::{Config, format_clock_time};
use crate::engine::AlertEngine;
use crate::notify::{NotificationDispatcher, NotificationSink, NotifyContext};
use crate::store::{PersistQueue, Snapshot};
use crate::suppression::{DailyClear, SuppressionRegistry, SuppressionState};
use crate::timer::Fired;
use crate::tracing::prelude::*;
use crate::types::{AlertEvent, AlertRecord, Symbol};

/// Command queue depth between the API and the actor.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Events buffered per subscriber before it is dropped as lagging.
pub const EVENT_BUFFER: usize = 256;

/// Handles the API needs to reach the actor.
#[derive(Clone)]
pub struct ServiceHandle {
    pub cmd_tx: mpsc::Sender<AlertCommand>,
    pub visible: watch::Receiver<Vec<AlertRecord>>,
}

pub struct Service {
    engine: AlertEngine,
    registry: SuppressionRegistry,
    dispatcher: NotificationDispatcher,
    notify_ctx: NotifyContext,
    cmd_rx: mpsc::Receiver<AlertCommand>,
    purge_rx: mpsc::UnboundedReceiver<Fired<Symbol>>,
    daily_rx: mpsc::UnboundedReceiver<Fired<DailyClear>>,
    subscribers: Vec<mpsc::Sender<ServiceEvent>>,
}

impl Service {
    /// Assemble the actor from restored state.
    ///
    /// Must be called from within a tokio runtime: the registry arms its
    /// daily timer (and may catch up a missed reset) right away.
    pub fn new(
        config: &Config,
        snapshot: Snapshot,
        clock: Arc<dyn Clock>,
        persist: PersistQueue,
        sink: Arc<dyn NotificationSink>,
    ) -> (Self, ServiceHandle) {
        let state = SuppressionState {
            ignored: snapshot.ignored,
            snoozed: snapshot.snoozed,
            metadata: snapshot.snooze_metadata,
        };
        let (registry, daily_rx) = SuppressionRegistry::new(
            state,
            config.snooze_clear_time,
            clock.clone(),
            persist.clone(),
        );
        let (engine, purge_rx) = AlertEngine::new(
            config.hiding_timeout,
            snapshot.visible_records,
            clock,
            persist,
        );
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        let handle = ServiceHandle {
            cmd_tx,
            visible: engine.subscribe_visible(),
        };
        let service = Self {
            engine,
            registry,
            dispatcher: NotificationDispatcher::new(sink),
            notify_ctx: NotifyContext {
                prefs: config.notifications,
                app_foreground: false,
            },
            cmd_rx,
            purge_rx,
            daily_rx,
            subscribers: Vec::new(),
        };
        (service, handle)
    }

    pub async fn run(mut self, running: CancellationToken) {
        trace!("Service task started.");
        info!(
            visible = self.engine.visible().count(),
            ignored = self.registry.ignored().len(),
            snoozed = self.registry.snoozed().len(),
            "Alert service running"
        );

        loop {
            tokio::select! {
                Some(cmd) = self.cmd_rx.recv() => {
                    self.handle_command(cmd);
                }

                Some(fired) = self.purge_rx.recv() => {
                    if let Some(symbol) = self.engine.on_purge(&fired) {
                        self.emit(ServiceEvent::Purged { symbol: symbol.to_string() });
                    }
                }

                Some(fired) = self.daily_rx.recv() => {
                    if self.registry.on_daily_clear(&fired) {
                        self.emit(ServiceEvent::SnoozeReset);
                    }
                }

                _ = running.cancelled() => {
                    info!("Service shutdown requested");
                    break;
                }
            }
        }

        trace!("Service task stopped.");
    }

    fn handle_command(&mut self, cmd: AlertCommand) {
        // A dropped reply means the caller gave up (timeout or disconnect);
        // the command still took effect.
        match cmd {
            AlertCommand::Alert { event, reply } => {
                let _ = reply.send(self.handle_alert(event));
            }
            AlertCommand::Hide { symbol, reply } => {
                let changed = self.engine.hide(&symbol);
                self.emit_if(changed, ServiceEvent::AlertsChanged);
                let _ = reply.send(changed);
            }
            AlertCommand::Reveal { symbol, reply } => {
                let changed = self.engine.reveal(&symbol);
                self.emit_if(changed, ServiceEvent::AlertsChanged);
                let _ = reply.send(changed);
            }
            AlertCommand::Dismiss { symbol, reply } => {
                let changed = self.engine.dismiss(&symbol);
                self.emit_if(changed, ServiceEvent::AlertsChanged);
                let _ = reply.send(changed);
            }
            AlertCommand::ClearAlerts { reply } => {
                self.engine.clear_all();
                self.emit(ServiceEvent::AlertsChanged);
                let _ = reply.send(());
            }
            AlertCommand::UpdateAlert {
                symbol,
                patch,
                reply,
            } => {
                let updated = self.update_alert(&symbol, patch);
                self.emit_if(updated.is_some(), ServiceEvent::AlertsChanged);
                let _ = reply.send(updated);
            }
            AlertCommand::MarkAllRead { reply } => {
                let changed = self.engine.mark_all_read();
                self.emit_if(changed > 0, ServiceEvent::AlertsChanged);
                let _ = reply.send(changed);
            }
            AlertCommand::ListSymbols { list, reply } => {
                let set = match list {
                    ListKind::Ignored => self.registry.ignored(),
                    ListKind::Snoozed => self.registry.snoozed(),
                };
                let _ = reply.send(set.iter().map(Symbol::to_string).collect());
            }
            AlertCommand::SetMember {
                list,
                symbol,
                member,
                reply,
            } => {
                let changed = match (list, member) {
                    (ListKind::Ignored, true) => self.registry.add_ignore(symbol),
                    (ListKind::Ignored, false) => self.registry.remove_ignore(&symbol),
                    (ListKind::Snoozed, member) => self.registry.set_snoozed(symbol, member),
                };
                self.emit_if(changed, ServiceEvent::SuppressionsChanged);
                let _ = reply.send(changed);
            }
            AlertCommand::ClearList { list, reply } => {
                match list {
                    ListKind::Ignored => self.registry.clear_ignore(),
                    ListKind::Snoozed => self.registry.clear_snooze(),
                }
                self.emit(ServiceEvent::SuppressionsChanged);
                let _ = reply.send(());
            }
            AlertCommand::GetSettings { reply } => {
                let _ = reply.send(self.settings());
            }
            AlertCommand::UpdateSettings { update, reply } => {
                self.update_settings(update);
                self.emit(ServiceEvent::SettingsChanged);
                let _ = reply.send(self.settings());
            }
            AlertCommand::Subscribe { reply } => {
                let (tx, rx) = mpsc::channel(EVENT_BUFFER);
                if reply.send(rx).is_ok() {
                    self.subscribers.push(tx);
                    debug!(subscribers = self.subscribers.len(), "Event subscriber added");
                }
            }
        }
    }

    fn handle_alert(&mut self, event: AlertEvent) -> AlertResponse {
        let outcome = self.engine.handle(&event, &mut self.registry);
        let kinds = self
            .dispatcher
            .dispatch(&event, &outcome, &self.notify_ctx)
            .into_iter()
            .map(|n| n.kind)
            .collect();

        let response = AlertResponse::new(&outcome, kinds);
        self.emit(ServiceEvent::Alert {
            symbol: event.symbol.to_string(),
            high_priority: event.is_high_priority,
            response: response.clone(),
        });
        response
    }

    fn update_alert(&mut self, symbol: &Symbol, patch: AlertPatchRequest) -> Option<AlertView> {
        // Bail out before touching anything if the symbol is not visible.
        let mut record = self.engine.visible_record(symbol)?.clone();
        if let Some(starred) = patch.starred {
            record = self.engine.set_starred(symbol, starred)?;
        }
        if let Some(unread) = patch.unread {
            record = self.engine.set_unread(symbol, unread)?;
        }
        if let Some(direction) = patch.direction {
            record = self.engine.set_direction(symbol, direction)?;
        }
        Some((&record).into())
    }

    fn update_settings(&mut self, update: SettingsUpdate) {
        if let Some(timeout) = update.hiding_timeout {
            info!(timeout_secs = timeout.as_secs(), "Hiding timeout changed");
            self.engine.set_hiding_timeout(timeout);
        }
        if let Some(clear_time) = update.snooze_clear_time {
            self.registry.set_clear_time(clear_time);
        }
        if let Some(prefs) = update.notifications {
            debug!(?prefs, "Notification preferences changed");
            self.notify_ctx.prefs = prefs;
        }
        if let Some(foreground) = update.app_foreground {
            debug!(foreground, "App foreground state changed");
            self.notify_ctx.app_foreground = foreground;
        }
    }

    fn settings(&self) -> Settings {
        Settings {
            hiding_timeout_secs: self.engine.hiding_timeout().as_secs(),
            snooze_clear_time: format_clock_time(self.registry.clear_time()),
            next_snooze_clear_at: self.registry.next_clear_at(),
            last_snooze_clear_at: self.registry.last_clear_at(),
            notifications: self.notify_ctx.prefs,
            app_foreground: self.notify_ctx.app_foreground,
        }
    }

    /// Fan an event out to subscribers, dropping any that are gone or
    /// too far behind.
    fn emit(&mut self, event: ServiceEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(capacity = EVENT_BUFFER, "Dropping lagging event subscriber");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
    }

    fn emit_if(&mut self, condition: bool, event: ServiceEvent) {
        if condition {
            self.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use time::macros::datetime;
    use tokio::sync::oneshot;

    use super::*;
    use crate::clock::AnchoredClock;
    use crate::engine::SuppressReason;
    use crate::notify::{MemorySink, NotificationKind};

    struct Harness {
        handle: ServiceHandle,
        sink: Arc<MemorySink>,
        running: CancellationToken,
        task: tokio::task::JoinHandle<()>,
        _writes: mpsc::UnboundedReceiver<crate::store::Write>,
    }

    impl Harness {
        fn start(snapshot: Snapshot) -> Self {
            let config = Config {
                hiding_timeout: Duration::from_secs(60),
                ..Config::default()
            };
            let clock = Arc::new(AnchoredClock::new(datetime!(2025-03-03 14:30 UTC)));
            let (persist, writes) = PersistQueue::new();
            let sink = Arc::new(MemorySink::new());
            let (service, handle) = Service::new(&config, snapshot, clock, persist, sink.clone());
            let running = CancellationToken::new();
            let task = tokio::spawn(service.run(running.clone()));
            Self {
                handle,
                sink,
                running,
                task,
                _writes: writes,
            }
        }

        async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> AlertCommand) -> T {
            let (tx, rx) = oneshot::channel();
            self.handle.cmd_tx.send(make(tx)).await.unwrap();
            rx.await.unwrap()
        }

        async fn alert(&self, symbol: &str, high: bool) -> AlertResponse {
            let event = AlertEvent::new(sym(symbol), high);
            self.request(|reply| AlertCommand::Alert { event, reply }).await
        }

        async fn stop(self) {
            self.running.cancel();
            self.task.await.unwrap();
        }
    }

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn alert_is_handled_and_notified() {
        let h = Harness::start(Snapshot::default());

        let response = h.alert("AAPL", false).await;
        assert!(response.surfaced);
        assert_eq!(response.was_new, Some(true));
        assert_eq!(response.notifications, vec![NotificationKind::System]);
        assert_eq!(h.sink.take().len(), 1);
        assert_eq!(h.handle.visible.borrow().len(), 1);

        let response = h.alert("AAPL", false).await;
        assert_eq!(response.reason, Some(SuppressReason::Duplicate));
        assert!(response.notifications.is_empty());
        assert!(h.sink.take().is_empty());

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn foreground_setting_enables_toasts() {
        let h = Harness::start(Snapshot::default());

        let update = SettingsUpdate {
            app_foreground: Some(true),
            ..Default::default()
        };
        let settings = h
            .request(|reply| AlertCommand::UpdateSettings { update, reply })
            .await;
        assert!(settings.app_foreground);

        let response = h.alert("NVDA", true).await;
        assert_eq!(
            response.notifications,
            vec![NotificationKind::Toast, NotificationKind::System]
        );

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn purge_runs_on_the_actor() {
        let h = Harness::start(Snapshot::default());
        let mut events = h.request(|reply| AlertCommand::Subscribe { reply }).await;

        h.alert("AMD", false).await;
        let symbol = sym("AMD");
        assert!(h.request(|reply| AlertCommand::Hide { symbol, reply }).await);
        assert_eq!(h.alert("AMD", true).await.reason, Some(SuppressReason::Cooldown));

        // Past the deadline so the purge lands before the next command.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.alert("AMD", false).await.was_new, Some(true));

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen.contains(&ServiceEvent::Purged {
            symbol: "AMD".into()
        }));
        assert!(seen.contains(&ServiceEvent::AlertsChanged));

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_subscriber_is_dropped() {
        let h = Harness::start(Snapshot::default());
        let mut stalled = h.request(|reply| AlertCommand::Subscribe { reply }).await;

        for _ in 0..=EVENT_BUFFER {
            h.request(|reply| AlertCommand::ClearAlerts { reply }).await;
        }
        let mut active = h.request(|reply| AlertCommand::Subscribe { reply }).await;
        h.request(|reply| AlertCommand::ClearAlerts { reply }).await;

        let mut buffered = 0;
        while stalled.try_recv().is_ok() {
            buffered += 1;
        }
        assert_eq!(buffered, EVENT_BUFFER);
        assert!(stalled.recv().await.is_none());
        assert_eq!(active.try_recv().unwrap(), ServiceEvent::AlertsChanged);

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn suppression_lists_round_trip() {
        let h = Harness::start(Snapshot::default());

        let symbol = sym("TSLA");
        let added = h
            .request(|reply| AlertCommand::SetMember {
                list: ListKind::Ignored,
                symbol,
                member: true,
                reply,
            })
            .await;
        assert!(added);
        assert_eq!(h.alert("TSLA", true).await.reason, Some(SuppressReason::Ignored));

        let listed = h
            .request(|reply| AlertCommand::ListSymbols {
                list: ListKind::Ignored,
                reply,
            })
            .await;
        assert_eq!(listed, vec!["TSLA".to_string()]);

        h.request(|reply| AlertCommand::ClearList {
            list: ListKind::Ignored,
            reply,
        })
        .await;
        assert!(h.alert("TSLA", false).await.surfaced);

        h.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn update_alert_applies_patch() {
        let h = Harness::start(Snapshot::default());
        h.alert("AAPL", false).await;

        let symbol = sym("AAPL");
        let patch = AlertPatchRequest {
            starred: Some(true),
            unread: Some(false),
            direction: None,
        };
        let view = h
            .request(|reply| AlertCommand::UpdateAlert {
                symbol,
                patch,
                reply,
            })
            .await
            .unwrap();
        assert!(view.is_starred);
        assert!(!view.is_unread);

        let symbol = sym("MSFT");
        let missing = h
            .request(|reply| AlertCommand::UpdateAlert {
                symbol,
                patch: AlertPatchRequest::default(),
                reply,
            })
            .await;
        assert!(missing.is_none());

        h.stop().await;
    }
}
