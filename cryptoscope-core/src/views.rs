//! Data access layer: derived views over the full store contents.
//!
//! Everything here is a pure function of the rows passed in.

use crate::domain::Snapshot;
use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// One row per asset. The first row encountered for each `asset_id` wins, whatever
/// its timestamp.
pub fn latest_per_asset(rows: &[Snapshot]) -> BTreeMap<String, Snapshot> {
    let mut latest = BTreeMap::new();
    for row in rows {
        latest
            .entry(row.asset_id.clone())
            .or_insert_with(|| row.clone());
    }
    latest
}

/// Time bucket width for trend aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// Exact `observed_at`.
    #[default]
    Raw,
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub fn bucket(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        let width = match self {
            Granularity::Raw => return t,
            Granularity::Minute => TimeDelta::minutes(1),
            Granularity::Hour => TimeDelta::hours(1),
            Granularity::Day => TimeDelta::days(1),
        };
        // Only fails for widths beyond the representable range.
        t.duration_trunc(width).unwrap_or(t)
    }
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(Granularity::Raw),
            "minute" => Ok(Granularity::Minute),
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            other => Err(format!("unknown granularity '{other}' (raw, minute, hour, day)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendPoint {
    pub bucket: DateTime<Utc>,
    pub mean_price: f64,
    /// Rows averaged into this point.
    pub samples: usize,
}

/// Mean price per time bucket, one series per asset name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendTable {
    pub granularity: Granularity,
    pub series: BTreeMap<String, Vec<TrendPoint>>,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv flush failed: {0}")]
    Flush(String),

    #[error("csv output is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl TrendTable {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Union of all buckets, ascending.
    pub fn buckets(&self) -> Vec<DateTime<Utc>> {
        let all: BTreeSet<DateTime<Utc>> = self
            .series
            .values()
            .flat_map(|points| points.iter().map(|p| p.bucket))
            .collect();
        all.into_iter().collect()
    }

    /// Wide CSV: a `bucket` column, then one column per asset name. A name with no
    /// rows in a bucket leaves that cell empty.
    pub fn to_csv(&self) -> Result<String, ExportError> {
        let mut wtr = csv::Writer::from_writer(vec![]);

        let mut header = vec!["bucket".to_string()];
        header.extend(self.series.keys().cloned());
        wtr.write_record(&header)?;

        let lookups: Vec<BTreeMap<DateTime<Utc>, f64>> = self
            .series
            .values()
            .map(|points| points.iter().map(|p| (p.bucket, p.mean_price)).collect())
            .collect();

        for bucket in self.buckets() {
            let mut record = vec![bucket.to_rfc3339()];
            record.extend(
                lookups
                    .iter()
                    .map(|l| l.get(&bucket).map(|v| format!("{v:.6}")).unwrap_or_default()),
            );
            wtr.write_record(&record)?;
        }

        let data = wtr.into_inner().map_err(|e| ExportError::Flush(e.to_string()))?;
        Ok(String::from_utf8(data)?)
    }
}

/// Group rows by `(bucket(observed_at), name)` and average `current_price`.
pub fn aggregate_by_time(rows: &[Snapshot], granularity: Granularity) -> TrendTable {
    let mut sums: BTreeMap<&str, BTreeMap<DateTime<Utc>, (f64, usize)>> = BTreeMap::new();
    for row in rows {
        let cell = sums
            .entry(row.name.as_str())
            .or_default()
            .entry(granularity.bucket(row.observed_at))
            .or_insert((0.0, 0));
        cell.0 += row.current_price;
        cell.1 += 1;
    }

    let series = sums
        .into_iter()
        .map(|(name, buckets)| {
            let points = buckets
                .into_iter()
                .map(|(bucket, (sum, samples))| TrendPoint {
                    bucket,
                    mean_price: sum / samples as f64,
                    samples,
                })
                .collect();
            (name.to_string(), points)
        })
        .collect();

    TrendTable {
        granularity,
        series,
    }
}
