//! Notification planning and delivery.
//!
//! [`plan`] decides which kinds of notification an engine outcome produces.
//! [`NotificationDispatcher`] adds the sound decision on top and hands the
//! result to a [`NotificationSink`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::engine::Outcome;
use crate::tracing::prelude::*;
use crate::types::{AlertEvent, Cooldown, Symbol};

/// Minimum spacing between two alert sounds.
pub const SOUND_COOLDOWN: Duration = Duration::from_secs(2);

/// User notification preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct NotificationPrefs {
    /// In-app toasts, shown only while the app is in the foreground.
    pub in_app: bool,
    /// Desktop (system) notifications.
    pub desktop: bool,
    pub sound: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        Self {
            in_app: true,
            desktop: true,
            sound: true,
        }
    }
}

/// Everything besides the outcome that decides what gets shown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyContext {
    pub prefs: NotificationPrefs,
    pub app_foreground: bool,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NotificationKind {
    Toast,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub symbol: Symbol,
    pub is_high_priority: bool,
    pub play_sound: bool,
}

/// Notification kinds produced by one handled alert.
pub fn plan(_event: &AlertEvent, outcome: &Outcome, ctx: &NotifyContext) -> Vec<NotificationKind> {
    if !outcome.is_surfaced() {
        return Vec::new();
    }

    let mut kinds = Vec::with_capacity(2);
    if ctx.prefs.in_app && ctx.app_foreground {
        kinds.push(NotificationKind::Toast);
    }
    if ctx.prefs.desktop {
        kinds.push(NotificationKind::System);
    }
    kinds
}

/// Receiver of planned notifications.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, n: &Notification) {
        info!(
            kind = %n.kind,
            symbol = %n.symbol,
            high_priority = n.is_high_priority,
            sound = n.play_sound,
            "Notification"
        );
    }
}

/// Sink that keeps every notification it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<Notification>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything delivered so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.delivered.lock())
    }
}

impl NotificationSink for MemorySink {
    fn deliver(&self, notification: &Notification) {
        self.delivered.lock().push(notification.clone());
    }
}

/// Turns outcomes into notifications and rate-limits their sound.
pub struct NotificationDispatcher {
    sound: Cooldown,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_sound_cooldown(sink, SOUND_COOLDOWN)
    }

    pub fn with_sound_cooldown(sink: Arc<dyn NotificationSink>, interval: Duration) -> Self {
        Self {
            sound: Cooldown::new(interval),
            sink,
        }
    }

    /// Plan, deliver and return the notifications for one outcome.
    ///
    /// Only the first notification may carry sound. A sound dropped by the
    /// cooldown leaves the notification itself untouched.
    pub fn dispatch(
        &mut self,
        event: &AlertEvent,
        outcome: &Outcome,
        ctx: &NotifyContext,
    ) -> Vec<Notification> {
        let kinds = plan(event, outcome, ctx);
        if kinds.is_empty() {
            return Vec::new();
        }

        let play_sound = ctx.prefs.sound && self.sound.try_acquire().is_acquired();
        if ctx.prefs.sound && !play_sound {
            debug!(symbol = %event.symbol, "Sound skipped; cooling down");
        }

        let notifications: Vec<Notification> = kinds
            .into_iter()
            .enumerate()
            .map(|(i, kind)| Notification {
                kind,
                symbol: event.symbol.clone(),
                is_high_priority: event.is_high_priority,
                play_sound: play_sound && i == 0,
            })
            .collect();

        for notification in &notifications {
            self.sink.deliver(notification);
        }
        notifications
    }
}
