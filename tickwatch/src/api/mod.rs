//! HTTP API.
//!
//! Versioned routes live under `/api/v0`. Handlers never touch engine
//! state directly: reads come from watch snapshots, everything else goes
//! to the service actor as an [`commands::AlertCommand`].

pub mod commands;
mod server;
mod v0;

pub use server::{ApiError, SharedState, router, serve};
