//! Alert events and visible alert records.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Symbol;

/// A validated inbound alert.
///
/// Built by the ingress from a raw payload; the engine only ever sees this
/// normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    pub symbol: Symbol,
    pub is_high_priority: bool,
}

impl AlertEvent {
    pub fn new(symbol: Symbol, is_high_priority: bool) -> Self {
        Self {
            symbol,
            is_high_priority,
        }
    }
}

/// User-assigned trade direction for a record.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Direction {
    #[default]
    None,
    Bullish,
    Bearish,
}

/// One entry in the visible alert list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub symbol: Symbol,
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen_at: OffsetDateTime,
    pub is_unread: bool,
    pub is_starred: bool,
    #[serde(default)]
    pub direction: Direction,
}

impl AlertRecord {
    /// A fresh record: unread, not starred, no direction.
    pub fn new(symbol: Symbol, first_seen_at: OffsetDateTime) -> Self {
        Self {
            symbol,
            first_seen_at,
            is_unread: true,
            is_starred: false,
            direction: Direction::None,
        }
    }
}
