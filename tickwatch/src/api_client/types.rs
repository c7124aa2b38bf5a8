//! API data transfer objects.
//!
//! These types define the API contract shared between the server and
//! clients.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::engine::{Outcome, SuppressReason};
use crate::notify::{NotificationKind, NotificationPrefs};
use crate::types::{AlertRecord, Direction};

/// A visible alert.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct AlertView {
    pub symbol: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub first_seen_at: OffsetDateTime,
    pub is_unread: bool,
    pub is_starred: bool,
    pub direction: Direction,
}

impl From<&AlertRecord> for AlertView {
    fn from(record: &AlertRecord) -> Self {
        Self {
            symbol: record.symbol.to_string(),
            first_seen_at: record.first_seen_at,
            is_unread: record.is_unread,
            is_starred: record.is_starred,
            direction: record.direction,
        }
    }
}

/// What happened to a posted alert.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct AlertResponse {
    pub surfaced: bool,
    /// Set when surfaced: whether the symbol was new to the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_new: Option<bool>,
    /// Set when suppressed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SuppressReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<AlertView>,
    /// Notifications raised for this alert.
    #[serde(default)]
    pub notifications: Vec<NotificationKind>,
}

impl AlertResponse {
    pub fn new(outcome: &Outcome, notifications: Vec<NotificationKind>) -> Self {
        match outcome {
            Outcome::Suppressed(reason) => Self {
                surfaced: false,
                was_new: None,
                reason: Some(*reason),
                record: None,
                notifications,
            },
            Outcome::Surfaced { record, was_new } => Self {
                surfaced: true,
                was_new: Some(*was_new),
                reason: None,
                record: Some(record.into()),
                notifications,
            },
        }
    }
}

/// Partial update of a visible alert.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct AlertPatchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starred: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unread: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

/// Result of a per-symbol action such as hide or dismiss.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ActionResult {
    pub symbol: String,
    /// Whether the action changed anything.
    pub changed: bool,
}

/// Result of marking every alert read.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct MarkReadResult {
    pub changed: usize,
}

/// Runtime settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct Settings {
    pub hiding_timeout_secs: u64,
    /// Daily snooze clear time, `HH:MM` local.
    pub snooze_clear_time: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub next_snooze_clear_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub last_snooze_clear_at: Option<OffsetDateTime>,
    pub notifications: NotificationPrefs,
    pub app_foreground: bool,
}

/// Partial settings update.
#[derive(Clone, Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct SettingsPatchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hiding_timeout_secs: Option<u64>,
    /// `HH:MM` local.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snooze_clear_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationPrefs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_foreground: Option<bool>,
}

/// Health report.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct Health {
    pub status: String,
    pub visible: usize,
    /// Last persistence failure, cleared by the next successful write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

/// Error body for every non-2xx response.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Change notification pushed on the event stream.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServiceEvent {
    /// An alert was handled.
    Alert {
        symbol: String,
        high_priority: bool,
        response: AlertResponse,
    },
    /// A hidden symbol's cooldown ran out and it was forgotten.
    Purged { symbol: String },
    /// The daily snooze reset ran.
    SnoozeReset,
    /// The visible list changed through a user action.
    AlertsChanged,
    /// The ignore or snooze list changed through a user action.
    SuppressionsChanged,
    SettingsChanged,
}
