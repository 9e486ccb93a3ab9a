//! Feature construction for the per-asset forecaster.
//!
//! Selects one asset's rows, orders them chronologically and lays them out as a
//! design matrix whose first column is always the observation time in epoch seconds.

use crate::domain::Snapshot;
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Which columns feed the regression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSet {
    /// `[timestamp]`
    #[default]
    Timestamp,
    /// `[timestamp, high_24h, low_24h, total_volume, market_cap]`
    Market,
}

impl FeatureSet {
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            FeatureSet::Timestamp => &["timestamp"],
            FeatureSet::Market => &["timestamp", "high_24h", "low_24h", "total_volume", "market_cap"],
        }
    }

    /// Feature row for one snapshot, or `None` if a selected field is missing.
    fn row(&self, snap: &Snapshot) -> Option<Vec<f64>> {
        let ts = snap.epoch_seconds();
        match self {
            FeatureSet::Timestamp => Some(vec![ts]),
            FeatureSet::Market => Some(vec![
                ts,
                snap.high_24h?,
                snap.low_24h?,
                snap.total_volume?,
                snap.market_cap?,
            ]),
        }
    }
}

/// Index of the time column in every feature set.
pub const TIME_COLUMN: usize = 0;

/// Chronologically ordered features and targets for one asset.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub asset_id: String,
    pub columns: Vec<&'static str>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn latest_observed_at(&self) -> Option<DateTime<Utc>> {
        self.timestamps.last().copied()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureOutcome {
    Ready(FeatureMatrix),
    InsufficientData { asset_id: String, rows: usize },
}

/// Builds feature matrices under a fixed feature set and history bound.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    pub feature_set: FeatureSet,
    pub min_rows: usize,
    pub max_rows: usize,
}

impl FeatureBuilder {
    pub fn new(feature_set: FeatureSet, min_rows: usize, max_rows: usize) -> Self {
        Self {
            feature_set,
            min_rows,
            max_rows,
        }
    }

    /// Build features for `asset_id` from an arbitrary slice of store rows.
    ///
    /// Rows are sorted ascending by `observed_at` (stable, so the first of two rows
    /// with the same timestamp wins), rows missing a selected field are dropped, and
    /// only the latest `max_rows` survive.
    pub fn build(&self, rows: &[Snapshot], asset_id: &str) -> FeatureOutcome {
        let mut history: Vec<&Snapshot> = rows.iter().filter(|s| s.asset_id == asset_id).collect();
        history.sort_by_key(|s| s.observed_at);
        history.dedup_by_key(|s| s.observed_at);

        let usable: Vec<(&Snapshot, Vec<f64>)> = history
            .into_iter()
            .filter(|s| s.current_price.is_finite())
            .filter_map(|s| self.feature_set.row(s).map(|r| (s, r)))
            .filter(|(_, r)| r.iter().all(|v| v.is_finite()))
            .collect();

        if usable.len() < self.min_rows {
            return FeatureOutcome::InsufficientData {
                asset_id: asset_id.to_string(),
                rows: usable.len(),
            };
        }

        let start = usable.len().saturating_sub(self.max_rows);
        let usable = &usable[start..];

        let columns = self.feature_set.columns().to_vec();
        let n_cols = columns.len();
        let flat: Vec<f64> = usable.iter().flat_map(|(_, r)| r.iter().copied()).collect();
        let x = match Array2::from_shape_vec((usable.len(), n_cols), flat) {
            Ok(x) => x,
            Err(_) => {
                return FeatureOutcome::InsufficientData {
                    asset_id: asset_id.to_string(),
                    rows: usable.len(),
                }
            }
        };
        let y: Array1<f64> = usable.iter().map(|(s, _)| s.current_price).collect();

        FeatureOutcome::Ready(FeatureMatrix {
            asset_id: asset_id.to_string(),
            columns,
            timestamps: usable.iter().map(|(s, _)| s.observed_at).collect(),
            x,
            y,
        })
    }
}

impl Default for FeatureBuilder {
    fn default() -> Self {
        Self::new(FeatureSet::Timestamp, 5, 5000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn hourly(asset: &str, hours: &[i64]) -> Vec<Snapshot> {
        hours
            .iter()
            .map(|&h| Snapshot::new(asset, asset, 100.0 + h as f64, t0() + Duration::hours(h)))
            .collect()
    }

    fn ready(outcome: FeatureOutcome) -> FeatureMatrix {
        match outcome {
            FeatureOutcome::Ready(m) => m,
            other => panic!("expected features, got {other:?}"),
        }
    }

    #[test]
    fn sorts_rows_and_ignores_other_assets() {
        let mut rows = hourly("BTC", &[3, 0, 4, 1, 2]);
        rows.extend(hourly("ETH", &[0, 1, 2, 3, 4, 5]));

        let m = ready(FeatureBuilder::default().build(&rows, "BTC"));
        assert_eq!(m.len(), 5);
        assert_eq!(m.y.to_vec(), vec![100.0, 101.0, 102.0, 103.0, 104.0]);
        assert!(m.timestamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(m.x[[0, TIME_COLUMN]], t0().timestamp() as f64);
    }

    #[test]
    fn fewer_than_min_rows_is_insufficient() {
        let rows = hourly("BTC", &[0, 1, 2, 3]);
        assert_eq!(
            FeatureBuilder::default().build(&rows, "BTC"),
            FeatureOutcome::InsufficientData {
                asset_id: "BTC".into(),
                rows: 4
            }
        );
    }

    #[test]
    fn unknown_asset_is_insufficient() {
        let rows = hourly("BTC", &[0, 1, 2, 3, 4]);
        assert!(matches!(
            FeatureBuilder::default().build(&rows, "DOGE"),
            FeatureOutcome::InsufficientData { rows: 0, .. }
        ));
    }

    #[test]
    fn market_set_drops_rows_with_missing_fields() {
        let mut rows = hourly("BTC", &[0, 1, 2, 3, 4, 5]);
        for (i, s) in rows.iter_mut().enumerate() {
            s.high_24h = Some(110.0);
            s.low_24h = Some(90.0);
            s.total_volume = Some(1e9);
            s.market_cap = if i == 2 { None } else { Some(1e12) };
        }

        let builder = FeatureBuilder::new(FeatureSet::Market, 5, 5000);
        let m = ready(builder.build(&rows, "BTC"));
        assert_eq!(m.len(), 5);
        assert_eq!(m.x.ncols(), 5);
        assert_eq!(m.columns, FeatureSet::Market.columns());

        rows[3].market_cap = None;
        assert!(matches!(
            builder.build(&rows, "BTC"),
            FeatureOutcome::InsufficientData { rows: 4, .. }
        ));
    }

    #[test]
    fn market_set_without_market_fields_is_insufficient() {
        let rows = hourly("BTC", &[0, 1, 2, 3, 4, 5]);
        let builder = FeatureBuilder::new(FeatureSet::Market, 5, 5000);
        assert!(matches!(
            builder.build(&rows, "BTC"),
            FeatureOutcome::InsufficientData { rows: 0, .. }
        ));
    }

    #[test]
    fn max_rows_keeps_most_recent_history() {
        let hours: Vec<i64> = (0..20).collect();
        let rows = hourly("BTC", &hours);
        let m = ready(FeatureBuilder::new(FeatureSet::Timestamp, 5, 8).build(&rows, "BTC"));
        assert_eq!(m.len(), 8);
        assert_eq!(m.latest_observed_at(), Some(t0() + Duration::hours(19)));
        assert_eq!(m.timestamps[0], t0() + Duration::hours(12));
    }

    #[test]
    fn duplicate_timestamps_keep_first_row() {
        let mut rows = hourly("BTC", &[0, 1, 2, 3, 4]);
        let mut dup = rows[2].clone();
        dup.current_price = -1.0;
        rows.push(dup);

        let m = ready(FeatureBuilder::default().build(&rows, "BTC"));
        assert_eq!(m.len(), 5);
        assert_eq!(m.y[2], 102.0);
    }
}
