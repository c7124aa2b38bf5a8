//! Crate-wide error type.

use thiserror::Error;

/// Errors surfaced by the tickwatch library.
///
/// The alert engine itself is total; these come from the edges: payload
/// validation, configuration, and the persistence adapter.
#[derive(Debug, Error)]
pub enum Error {
    /// Symbol failed ticker-shape validation.
    #[error("invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Ingress payload could not be decoded.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Configuration value could not be parsed.
    #[error("invalid configuration for {key}: {reason}")]
    Config { key: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tickwatch operations.
pub type Result<T> = std::result::Result<T, Error>;
