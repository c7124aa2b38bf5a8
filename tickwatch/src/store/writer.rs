//! Background task that applies queued writes to a [`Store`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::{Store, Write};
use crate::tracing::prelude::*;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Single consumer of the [`PersistQueue`](super::PersistQueue) channel.
///
/// Writes are applied strictly in queue order. When several writes are
/// waiting, only the newest of each kind is applied: every write carries
/// the full state for its kind, so the older ones are already obsolete and
/// skipping them can never resurrect stale data.
pub struct StoreWriter {
    store: Arc<dyn Store>,
    rx: mpsc::UnboundedReceiver<Write>,
    last_error_tx: watch::Sender<Option<String>>,
}

impl StoreWriter {
    pub fn new(store: Arc<dyn Store>, rx: mpsc::UnboundedReceiver<Write>) -> Self {
        let (last_error_tx, _) = watch::channel(None);
        Self {
            store,
            rx,
            last_error_tx,
        }
    }

    /// Most recent unrecovered write failure, cleared by the next success.
    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.last_error_tx.subscribe()
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        trace!("Store writer started.");

        loop {
            tokio::select! {
                write = self.rx.recv() => {
                    let Some(first) = write else {
                        break;
                    };
                    let mut batch = vec![first];
                    while let Ok(next) = self.rx.try_recv() {
                        batch.push(next);
                    }
                    self.apply_batch(batch).await;
                }
                _ = shutdown.cancelled() => {
                    // Flush whatever was queued before shutdown.
                    self.rx.close();
                    let mut batch = Vec::new();
                    while let Some(next) = self.rx.recv().await {
                        batch.push(next);
                    }
                    self.apply_batch(batch).await;
                    break;
                }
            }
        }

        trace!("Store writer stopped.");
    }

    async fn apply_batch(&self, batch: Vec<Write>) {
        for write in coalesce(batch) {
            self.apply_with_retry(&write).await;
        }
    }

    async fn apply_with_retry(&self, write: &Write) {
        let mut delay = INITIAL_RETRY_DELAY;

        for attempt in 1..=MAX_ATTEMPTS {
            match write.apply(self.store.as_ref()).await {
                Ok(()) => {
                    trace!(kind = write.kind(), "Persisted");
                    self.last_error_tx.send_if_modified(|last| last.take().is_some());
                    return;
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(kind = write.kind(), attempt, error = %e, "Write failed; retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    error!(kind = write.kind(), error = %e, "Write failed; in-memory state kept");
                    self.last_error_tx
                        .send_replace(Some(format!("{}: {e}", write.kind())));
                }
            }
        }
    }
}

/// Keep only the last write of each kind, in their original order.
fn coalesce(batch: Vec<Write>) -> Vec<Write> {
    let mut keep = vec![true; batch.len()];
    for (i, write) in batch.iter().enumerate() {
        if batch[i + 1..].iter().any(|later| later.kind() == write.kind()) {
            keep[i] = false;
        }
    }
    batch
        .into_iter()
        .zip(keep)
        .filter_map(|(write, keep)| keep.then_some(write))
        .collect()
}
