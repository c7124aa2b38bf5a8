//! In-process store, used by tests and as a scratch backend.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{SnoozeMetadata, Store};
use crate::error::{Error, Result};
use crate::types::{AlertRecord, Symbol};

#[derive(Debug, Default)]
struct Contents {
    visible_records: Vec<AlertRecord>,
    ignored: BTreeSet<Symbol>,
    snoozed: BTreeSet<Symbol>,
    snooze_metadata: SnoozeMetadata,
    snoozed_corrupt: bool,
}

/// A [`Store`] that keeps everything in memory.
///
/// Writes can be made to fail on demand to exercise retry and reporting.
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<Contents>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_visible_records(&self, records: Vec<AlertRecord>) {
        self.contents.lock().visible_records = records;
    }

    pub fn seed_ignored(&self, symbols: impl IntoIterator<Item = Symbol>) {
        self.contents.lock().ignored = symbols.into_iter().collect();
    }

    pub fn seed_snoozed(&self, symbols: impl IntoIterator<Item = Symbol>) {
        self.contents.lock().snoozed = symbols.into_iter().collect();
    }

    pub fn seed_snooze_metadata(&self, metadata: SnoozeMetadata) {
        self.contents.lock().snooze_metadata = metadata;
    }

    /// Make the next snooze-set load fail as if the backing file were bad.
    pub fn corrupt_snoozed(&self) {
        self.contents.lock().snoozed_corrupt = true;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn visible_records(&self) -> Vec<AlertRecord> {
        self.contents.lock().visible_records.clone()
    }

    pub fn ignored(&self) -> BTreeSet<Symbol> {
        self.contents.lock().ignored.clone()
    }

    pub fn snoozed(&self) -> BTreeSet<Symbol> {
        self.contents.lock().snoozed.clone()
    }

    pub fn snooze_metadata(&self) -> SnoozeMetadata {
        self.contents.lock().snooze_metadata.clone()
    }

    fn write(&self, update: impl FnOnce(&mut Contents)) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::other("memory store write failure")));
        }
        update(&mut *self.contents.lock());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_visible_records(&self) -> Result<Vec<AlertRecord>> {
        Ok(self.visible_records())
    }

    async fn save_visible_records(&self, records: &[AlertRecord]) -> Result<()> {
        self.write(|c| c.visible_records = records.to_vec())
    }

    async fn load_ignored(&self) -> Result<BTreeSet<Symbol>> {
        Ok(self.ignored())
    }

    async fn save_ignored(&self, symbols: &BTreeSet<Symbol>) -> Result<()> {
        self.write(|c| c.ignored = symbols.clone())
    }

    async fn load_snoozed(&self) -> Result<BTreeSet<Symbol>> {
        let contents = self.contents.lock();
        if contents.snoozed_corrupt {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "snooze set unreadable",
            )));
        }
        Ok(contents.snoozed.clone())
    }

    async fn save_snoozed(&self, symbols: &BTreeSet<Symbol>) -> Result<()> {
        self.write(|c| {
            c.snoozed = symbols.clone();
            c.snoozed_corrupt = false;
        })
    }

    async fn load_snooze_metadata(&self) -> Result<SnoozeMetadata> {
        Ok(self.snooze_metadata())
    }

    async fn save_snooze_metadata(&self, metadata: &SnoozeMetadata) -> Result<()> {
        self.write(|c| c.snooze_metadata = metadata.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn corrupt_snooze_set_fails_to_load() {
        let store = MemoryStore::new();
        store.seed_snoozed([Symbol::parse("NVDA").unwrap()]);
        store.corrupt_snoozed();

        let err = store.load_snoozed().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got {err:?}");
        assert!(store.load_ignored().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_writes_leave_contents_alone() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let symbols = BTreeSet::from([Symbol::parse("TSLA").unwrap()]);

        assert!(store.save_ignored(&symbols).await.is_err());
        assert!(store.ignored().is_empty());

        store.set_fail_writes(false);
        store.save_ignored(&symbols).await.unwrap();
        assert_eq!(store.ignored(), symbols);
    }
}
