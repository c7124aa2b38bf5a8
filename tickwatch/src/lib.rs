//! Ticker alert deduplication and suppression service.
//!
//! Alerts arrive as `(symbol, high_priority)` events from the HTTP ingress
//! and are fed through a single service actor that owns the
//! [`engine::AlertEngine`], the [`suppression::SuppressionRegistry`] and
//! the [`notify::NotificationDispatcher`].

pub mod api;
pub mod api_client;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ingress;
pub mod notify;
pub mod service;
pub mod store;
pub mod suppression;
pub mod timer;
pub mod tracing;
pub mod types;
