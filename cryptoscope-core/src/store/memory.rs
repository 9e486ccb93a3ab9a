//! In-process copy-on-write store.

use super::{apply_batch, SnapshotStore, StoreError, WriteMode, WriteSummary};
use crate::domain::Snapshot;
use std::sync::{Arc, Mutex, RwLock};

/// Store backed by an `Arc`-swapped table.
///
/// A write builds the new table without holding the read lock and then swaps the
/// pointer, so readers always hold a complete table.
#[derive(Debug)]
pub struct MemoryStore {
    table: RwLock<Arc<Vec<Snapshot>>>,
    writer: Mutex<()>,
    mode: WriteMode,
}

impl MemoryStore {
    pub fn new(mode: WriteMode) -> Self {
        Self {
            table: RwLock::new(Arc::new(Vec::new())),
            writer: Mutex::new(()),
            mode,
        }
    }

    /// The current table without copying rows.
    pub fn snapshot(&self) -> Result<Arc<Vec<Snapshot>>, StoreError> {
        self.table
            .read()
            .map(|t| Arc::clone(&t))
            .map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WriteMode::Replace)
    }
}

impl SnapshotStore for MemoryStore {
    fn write(&self, batch: &[Snapshot]) -> Result<WriteSummary, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;

        let existing = match self.mode {
            WriteMode::Replace => Vec::new(),
            WriteMode::Merge => self.snapshot()?.as_ref().clone(),
        };
        let next = Arc::new(apply_batch(self.mode, existing, batch));
        let rows_total = next.len();

        *self.table.write().map_err(|_| StoreError::Poisoned)? = next;

        Ok(WriteSummary {
            mode: self.mode,
            rows_written: batch.len(),
            rows_total,
        })
    }

    fn read_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        Ok(self.snapshot()?.as_ref().clone())
    }

    fn write_mode(&self) -> WriteMode {
        self.mode
    }
}
