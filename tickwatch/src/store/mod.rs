//! Persistence port and its adapters.
//!
//! The engine and registry never await storage. They push [`Write`]s onto
//! a [`PersistQueue`], and a single [`StoreWriter`] task applies them to a
//! [`Store`] in the order they were queued. In-memory state stays the
//! source of truth for reads.

mod json;
mod memory;
mod writer;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::tracing::prelude::*;
use crate::types::{AlertRecord, Symbol};

pub use json::JsonStore;
pub use memory::MemoryStore;
pub use writer::StoreWriter;

/// Bookkeeping for the daily snooze reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeMetadata {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_clear_at: Option<OffsetDateTime>,
}

/// Backing storage for everything that survives a restart.
///
/// Pending hide cooldowns are deliberately absent: a restart forgets them.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_visible_records(&self) -> Result<Vec<AlertRecord>>;
    async fn save_visible_records(&self, records: &[AlertRecord]) -> Result<()>;

    async fn load_ignored(&self) -> Result<BTreeSet<Symbol>>;
    async fn save_ignored(&self, symbols: &BTreeSet<Symbol>) -> Result<()>;

    async fn load_snoozed(&self) -> Result<BTreeSet<Symbol>>;
    async fn save_snoozed(&self, symbols: &BTreeSet<Symbol>) -> Result<()>;

    async fn load_snooze_metadata(&self) -> Result<SnoozeMetadata>;
    async fn save_snooze_metadata(&self, metadata: &SnoozeMetadata) -> Result<()>;
}

/// A full-state write for one kind of persisted data.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    VisibleRecords(Vec<AlertRecord>),
    Ignored(BTreeSet<Symbol>),
    Snoozed(BTreeSet<Symbol>),
    SnoozeMetadata(SnoozeMetadata),
}

impl Write {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Write::VisibleRecords(_) => "visible_records",
            Write::Ignored(_) => "ignored",
            Write::Snoozed(_) => "snoozed",
            Write::SnoozeMetadata(_) => "snooze_metadata",
        }
    }

    pub(crate) async fn apply(&self, store: &dyn Store) -> Result<()> {
        match self {
            Write::VisibleRecords(records) => store.save_visible_records(records).await,
            Write::Ignored(symbols) => store.save_ignored(symbols).await,
            Write::Snoozed(symbols) => store.save_snoozed(symbols).await,
            Write::SnoozeMetadata(metadata) => store.save_snooze_metadata(metadata).await,
        }
    }
}

/// Non-blocking handle for queueing writes.
///
/// Cloneable; every clone feeds the same writer, and a single channel
/// keeps writes in the order they were issued.
#[derive(Debug, Clone)]
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<Write>,
}

impl PersistQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Write>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, write: Write) {
        let kind = write.kind();
        if self.tx.send(write).is_err() {
            debug!(kind, "Store writer gone; write dropped");
        }
    }

    pub fn save_visible_records(&self, records: Vec<AlertRecord>) {
        self.push(Write::VisibleRecords(records));
    }

    pub fn save_ignored(&self, symbols: BTreeSet<Symbol>) {
        self.push(Write::Ignored(symbols));
    }

    pub fn save_snoozed(&self, symbols: BTreeSet<Symbol>) {
        self.push(Write::Snoozed(symbols));
    }

    pub fn save_snooze_metadata(&self, metadata: SnoozeMetadata) {
        self.push(Write::SnoozeMetadata(metadata));
    }
}

/// Everything loaded from a [`Store`] at startup.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub visible_records: Vec<AlertRecord>,
    pub ignored: BTreeSet<Symbol>,
    pub snoozed: BTreeSet<Symbol>,
    pub snooze_metadata: SnoozeMetadata,
}

impl Snapshot {
    /// Load every kind of persisted state.
    ///
    /// A kind that fails to load is logged and starts out empty; a corrupt
    /// file must not keep the service from coming up.
    pub async fn load(store: &dyn Store) -> Self {
        let visible_records = store.load_visible_records().await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to load visible alerts; starting empty");
            Vec::new()
        });
        let ignored = store.load_ignored().await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to load ignore list; starting empty");
            BTreeSet::new()
        });
        let snoozed = store.load_snoozed().await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to load snooze list; starting empty");
            BTreeSet::new()
        });
        let snooze_metadata = store.load_snooze_metadata().await.unwrap_or_else(|e| {
            error!(error = %e, "Failed to load snooze metadata; starting empty");
            SnoozeMetadata::default()
        });

        Self {
            visible_records,
            ignored,
            snoozed,
            snooze_metadata,
        }
    }
}
