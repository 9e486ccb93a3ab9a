//! Parquet-backed snapshot store.
//!
//! Layout: `{dir}/cryptocurrency_data.parquet` plus a `cryptocurrency_data.meta.json`
//! sidecar.
//!
//! - Atomic commits (write to a per-writer .tmp, rename into place), safe for readers
//!   and writers in other processes
//! - Replace or merge write modes
//! - Per-asset reads through a lazy scan with a symbol predicate

use super::meta::BatchMeta;
use super::schema::{self, dataframe_to_snapshots, snapshots_to_dataframe, TABLE_NAME};
use super::{apply_batch, SnapshotStore, StoreError, WriteMode, WriteSummary};
use crate::domain::Snapshot;
use chrono::Utc;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

static NEXT_WRITER_ID: AtomicU64 = AtomicU64::new(0);

pub struct ParquetStore {
    dir: PathBuf,
    mode: WriteMode,
    writer: Mutex<()>,
    /// Distinguishes temp files of store instances within one process.
    writer_id: u64,
}

impl ParquetStore {
    pub fn new(dir: impl Into<PathBuf>, mode: WriteMode) -> Self {
        Self {
            dir: dir.into(),
            mode,
            writer: Mutex::new(()),
            writer_id: NEXT_WRITER_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the live table file.
    pub fn table_path(&self) -> PathBuf {
        self.dir.join(format!("{TABLE_NAME}.parquet"))
    }

    /// Temp file this writer stages a table in. Unique per process and instance.
    fn tmp_path(&self) -> PathBuf {
        self.dir.join(format!(
            "{TABLE_NAME}.parquet.{}-{}.tmp",
            std::process::id(),
            self.writer_id
        ))
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join(format!("{TABLE_NAME}.meta.json"))
    }

    /// Sidecar describing the last committed table, if one was written.
    pub fn read_meta(&self) -> Option<BatchMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn load_table(&self) -> Result<Vec<Snapshot>, StoreError> {
        let path = self.table_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let df = read_parquet(&path)?;
        dataframe_to_snapshots(&df)
    }

    fn write_meta(&self, rows: &[Snapshot]) -> Result<(), StoreError> {
        let meta = BatchMeta::describe(TABLE_NAME, self.mode, rows, Utc::now())
            .map_err(|e| StoreError::Io(format!("meta serialization: {e}")))?;
        let json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Io(format!("meta serialization: {e}")))?;

        let path = self.meta_path();
        let tmp_path = self.tmp_path().with_extension("meta.tmp");
        fs::write(&tmp_path, json).map_err(|e| StoreError::Io(format!("meta write: {e}")))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io(format!("meta rename: {e}"))
        })
    }
}

impl SnapshotStore for ParquetStore {
    fn write(&self, batch: &[Snapshot]) -> Result<WriteSummary, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;

        fs::create_dir_all(&self.dir)
            .map_err(|e| StoreError::Io(format!("failed to create {}: {e}", self.dir.display())))?;

        let existing = match self.mode {
            WriteMode::Replace => Vec::new(),
            WriteMode::Merge => self.load_table()?,
        };
        let table = apply_batch(self.mode, existing, batch);
        let mut df = snapshots_to_dataframe(&table)?;

        let path = self.table_path();
        let tmp_path = self.tmp_path();
        if let Err(e) = write_parquet(&mut df, &tmp_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io(format!("atomic rename failed: {e}"))
        })?;

        // The table is committed at this point; a sidecar failure only loses the summary.
        if let Err(e) = self.write_meta(&table) {
            warn!(error = %e, "table committed but metadata sidecar was not written");
        }

        info!(
            path = %path.display(),
            mode = ?self.mode,
            rows_written = batch.len(),
            rows_total = table.len(),
            "committed batch"
        );

        Ok(WriteSummary {
            mode: self.mode,
            rows_written: batch.len(),
            rows_total: table.len(),
        })
    }

    fn read_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        self.load_table()
    }

    fn read_asset(&self, asset_id: &str) -> Result<Vec<Snapshot>, StoreError> {
        let path = self.table_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())
            .map_err(|e| StoreError::Parquet(format!("scan: {e}")))?
            .filter(col(schema::SYMBOL).eq(lit(asset_id)))
            .collect()
            .map_err(|e| StoreError::Parquet(format!("scan {asset_id}: {e}")))?;

        let mut rows = dataframe_to_snapshots(&df)?;
        rows.sort_by_key(|s| s.observed_at);
        debug!(asset_id, rows = rows.len(), "per-asset scan");
        Ok(rows)
    }

    fn write_mode(&self) -> WriteMode {
        self.mode
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), StoreError> {
    let mut file =
        fs::File::create(path).map_err(|e| StoreError::Io(format!("create {}: {e}", path.display())))?;
    ParquetWriter::new(&mut file)
        .finish(df)
        .map_err(|e| StoreError::Parquet(format!("write parquet: {e}")))?;
    file.sync_all()
        .map_err(|e| StoreError::Io(format!("sync {}: {e}", path.display())))?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::Io(format!("open {}: {e}", path.display())))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read {}: {e}", path.display())))
}
