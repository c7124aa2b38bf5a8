//! Raw alert payloads and their validation.
//!
//! Alerts arrive as JSON objects:
//!
//! ```json
//! {"symbol": "nvda", "highPriority": true}
//! ```
//!
//! `highPriority` is optional and defaults to `false`. Anything that does
//! not decode, or whose symbol does not look like a ticker, is rejected
//! here and never reaches the engine.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{AlertEvent, Symbol};

/// Alert payload as sent by producers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct AlertPayload {
    /// Ticker symbol; trimmed and uppercased before validation.
    pub symbol: String,
    #[serde(default, rename = "highPriority", skip_serializing_if = "Option::is_none")]
    pub high_priority: Option<bool>,
}

impl AlertPayload {
    /// Decode a payload from raw request bytes.
    ///
    /// Only a JSON object is accepted, never a positional array.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| Error::InvalidPayload(e.to_string()))?;
        if !value.is_object() {
            return Err(Error::InvalidPayload("expected a JSON object".into()));
        }
        serde_json::from_value(value).map_err(|e| Error::InvalidPayload(e.to_string()))
    }

    /// Validate into an engine event.
    pub fn into_event(self) -> Result<AlertEvent> {
        let symbol = Symbol::parse(&self.symbol)?;
        Ok(AlertEvent::new(symbol, self.high_priority.unwrap_or(false)))
    }
}

/// Decode and validate raw request bytes in one step.
pub fn parse_alert(bytes: &[u8]) -> Result<AlertEvent> {
    AlertPayload::from_slice(bytes)?.into_event()
}
