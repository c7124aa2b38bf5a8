//! Command types sent from API handlers to the service actor.
//!
//! Each command carries a oneshot reply channel so the handler can
//! await the result and translate it into an HTTP response.

use std::time::Duration;

use time::Time;
use tokio::sync::{mpsc, oneshot};

use crate::api_client::types::{AlertPatchRequest, AlertResponse, AlertView, ServiceEvent, Settings};
use crate::notify::NotificationPrefs;
use crate::types::{AlertEvent, Symbol};

/// Validated settings change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsUpdate {
    pub hiding_timeout: Option<Duration>,
    pub snooze_clear_time: Option<Time>,
    pub notifications: Option<NotificationPrefs>,
    pub app_foreground: Option<bool>,
}

/// Which suppression list a command targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ListKind {
    Ignored,
    Snoozed,
}

/// Commands from the API to the service actor.
pub enum AlertCommand {
    /// Run an inbound alert through the engine and dispatcher.
    Alert {
        event: AlertEvent,
        reply: oneshot::Sender<AlertResponse>,
    },

    /// Take a symbol out of view and start its hide cooldown.
    Hide {
        symbol: Symbol,
        reply: oneshot::Sender<bool>,
    },

    /// Cancel a hide cooldown.
    Reveal {
        symbol: Symbol,
        reply: oneshot::Sender<bool>,
    },

    /// Remove a visible alert; the symbol stays known.
    Dismiss {
        symbol: Symbol,
        reply: oneshot::Sender<bool>,
    },

    /// Forget every alert and cooldown.
    ClearAlerts { reply: oneshot::Sender<()> },

    /// Update user marks on a visible alert. Replies `None` if the symbol
    /// is not visible.
    UpdateAlert {
        symbol: Symbol,
        patch: AlertPatchRequest,
        reply: oneshot::Sender<Option<AlertView>>,
    },

    /// Mark every visible alert read.
    MarkAllRead { reply: oneshot::Sender<usize> },

    /// List the members of a suppression list.
    ListSymbols {
        list: ListKind,
        reply: oneshot::Sender<Vec<String>>,
    },

    /// Add (`member = true`) or remove a symbol from a suppression list.
    SetMember {
        list: ListKind,
        symbol: Symbol,
        member: bool,
        reply: oneshot::Sender<bool>,
    },

    /// Empty a suppression list.
    ClearList {
        list: ListKind,
        reply: oneshot::Sender<()>,
    },

    GetSettings { reply: oneshot::Sender<Settings> },

    UpdateSettings {
        update: SettingsUpdate,
        reply: oneshot::Sender<Settings>,
    },

    /// Register for the change stream.
    Subscribe {
        reply: oneshot::Sender<mpsc::Receiver<ServiceEvent>>,
    },
}
