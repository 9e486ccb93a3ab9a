//! Time-series snapshot store.
//!
//! Two persistence modes share one contract: `write` commits a batch atomically and
//! `read_all` returns the whole table. Readers see either the table before a write or
//! the table after it, never a mix.

pub mod memory;
pub mod meta;
pub mod parquet;
pub mod schema;

pub use memory::MemoryStore;
pub use meta::BatchMeta;
pub use parquet::ParquetStore;
pub use schema::{SnapshotSchema, TABLE_NAME};

use crate::domain::Snapshot;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(String),

    #[error("parquet error: {0}")]
    Parquet(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// How a write combines with what is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// The batch becomes the entire table.
    #[default]
    Replace,
    /// The batch is merged into an append-only log keyed by `(asset_id, observed_at)`.
    /// Incoming rows overwrite stored rows with the same key. The log is ordered by
    /// asset, newest observation first.
    Merge,
}

/// What a committed write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub mode: WriteMode,
    pub rows_written: usize,
    pub rows_total: usize,
}

/// Storage backend for snapshot batches.
pub trait SnapshotStore: Send + Sync {
    /// Atomically commit `batch` according to the store's write mode.
    ///
    /// On error the previously committed table stays authoritative.
    fn write(&self, batch: &[Snapshot]) -> Result<WriteSummary, StoreError>;

    /// Every stored row, in store order. An empty store reads as an empty table.
    fn read_all(&self) -> Result<Vec<Snapshot>, StoreError>;

    /// One asset's rows, ascending by `observed_at`.
    fn read_asset(&self, asset_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        let mut rows: Vec<Snapshot> = self
            .read_all()?
            .into_iter()
            .filter(|s| s.asset_id == asset_id)
            .collect();
        rows.sort_by_key(|s| s.observed_at);
        Ok(rows)
    }

    fn write_mode(&self) -> WriteMode;
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for &T {
    fn write(&self, batch: &[Snapshot]) -> Result<WriteSummary, StoreError> {
        (**self).write(batch)
    }

    fn read_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        (**self).read_all()
    }

    fn read_asset(&self, asset_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        (**self).read_asset(asset_id)
    }

    fn write_mode(&self) -> WriteMode {
        (**self).write_mode()
    }
}

impl<T: SnapshotStore + ?Sized> SnapshotStore for Arc<T> {
    fn write(&self, batch: &[Snapshot]) -> Result<WriteSummary, StoreError> {
        (**self).write(batch)
    }

    fn read_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        (**self).read_all()
    }

    fn read_asset(&self, asset_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        (**self).read_asset(asset_id)
    }

    fn write_mode(&self) -> WriteMode {
        (**self).write_mode()
    }
}

/// Build the table that results from applying `batch` to `existing` under `mode`.
///
/// Incoming timestamps are truncated to the persisted millisecond precision, so a
/// batch keys the same way before and after a round trip through any backend.
pub fn apply_batch(mode: WriteMode, existing: Vec<Snapshot>, batch: &[Snapshot]) -> Vec<Snapshot> {
    let incoming = batch.iter().map(|s| s.at(s.observed_at.trunc_subsecs(3)));
    match mode {
        WriteMode::Replace => incoming.collect(),
        WriteMode::Merge => {
            let mut log: BTreeMap<MergeKey, Snapshot> =
                existing.into_iter().map(|s| (merge_key(&s), s)).collect();
            for snap in incoming {
                log.insert(merge_key(&snap), snap);
            }
            log.into_values().collect()
        }
    }
}

type MergeKey = (String, Reverse<DateTime<Utc>>);

fn merge_key(snap: &Snapshot) -> MergeKey {
    (snap.asset_id.clone(), Reverse(snap.observed_at))
}
