//! JSON-file store.
//!
//! One pretty-printed file per kind of state in a data directory. Files
//! are replaced atomically (write to a sibling temp file, then rename), so
//! a crash mid-write leaves the previous version intact.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{SnoozeMetadata, Store};
use crate::error::Result;
use crate::types::{AlertRecord, Symbol};

const VISIBLE_RECORDS_FILE: &str = "alerts.json";
const IGNORED_FILE: &str = "ignored.json";
const SNOOZED_FILE: &str = "snoozed.json";
const SNOOZE_METADATA_FILE: &str = "snooze_metadata.json";

/// A [`Store`] backed by JSON files.
#[derive(Debug, Clone)]
pub struct JsonStore {
    data_dir: PathBuf,
}

impl JsonStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Read `file`, or `T::default()` if it does not exist yet.
    async fn read<T: DeserializeOwned + Default>(&self, file: &str) -> Result<T> {
        let path = self.data_dir.join(file);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(T::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let path = self.data_dir.join(file);
        let tmp = self.data_dir.join(format!("{file}.tmp"));
        let content = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for JsonStore {
    async fn load_visible_records(&self) -> Result<Vec<AlertRecord>> {
        self.read(VISIBLE_RECORDS_FILE).await
    }

    async fn save_visible_records(&self, records: &[AlertRecord]) -> Result<()> {
        self.write(VISIBLE_RECORDS_FILE, records).await
    }

    async fn load_ignored(&self) -> Result<BTreeSet<Symbol>> {
        self.read(IGNORED_FILE).await
    }

    async fn save_ignored(&self, symbols: &BTreeSet<Symbol>) -> Result<()> {
        self.write(IGNORED_FILE, symbols).await
    }

    async fn load_snoozed(&self) -> Result<BTreeSet<Symbol>> {
        self.read(SNOOZED_FILE).await
    }

    async fn save_snoozed(&self, symbols: &BTreeSet<Symbol>) -> Result<()> {
        self.write(SNOOZED_FILE, symbols).await
    }

    async fn load_snooze_metadata(&self) -> Result<SnoozeMetadata> {
        self.read(SNOOZE_METADATA_FILE).await
    }

    async fn save_snooze_metadata(&self, metadata: &SnoozeMetadata) -> Result<()> {
        self.write(SNOOZE_METADATA_FILE, metadata).await
    }
}
