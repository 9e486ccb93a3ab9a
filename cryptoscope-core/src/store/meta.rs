//! Metadata sidecar written beside each committed table.

use super::WriteMode;
use crate::domain::Snapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Summary of the committed table. Advisory: the table file is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMeta {
    pub table: String,
    pub write_mode: WriteMode,
    pub row_count: usize,
    pub asset_count: usize,
    pub first_observed_at: Option<DateTime<Utc>>,
    pub last_observed_at: Option<DateTime<Utc>>,
    /// blake3 of the JSON-encoded table.
    pub data_hash: String,
    pub written_at: DateTime<Utc>,
}

impl BatchMeta {
    pub fn describe(
        table: &str,
        write_mode: WriteMode,
        rows: &[Snapshot],
        written_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let assets: BTreeSet<&str> = rows.iter().map(|s| s.asset_id.as_str()).collect();
        Ok(Self {
            table: table.to_string(),
            write_mode,
            row_count: rows.len(),
            asset_count: assets.len(),
            first_observed_at: rows.iter().map(|s| s.observed_at).min(),
            last_observed_at: rows.iter().map(|s| s.observed_at).max(),
            data_hash: content_hash(rows)?,
            written_at,
        })
    }
}

/// Content hash of a table; equal tables hash equal regardless of when they were written.
pub fn content_hash(rows: &[Snapshot]) -> Result<String, serde_json::Error> {
    Ok(blake3::hash(&serde_json::to_vec(rows)?).to_hex().to_string())
}
