//! Snapshot: one observation of one asset's market fields at one instant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single market observation.
///
/// `current_price` is the only numeric field the provider always reports; the rest
/// are `None` when the listing carries `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub asset_id: String,
    pub name: String,
    pub image_url: String,
    pub current_price: f64,
    pub market_cap: Option<f64>,
    pub total_volume: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub price_change_pct_24h: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

/// Identity of a row in the time-series log.
pub type SnapshotKey = (String, DateTime<Utc>);

impl Snapshot {
    /// Minimal snapshot with only the required fields set.
    pub fn new(
        asset_id: impl Into<String>,
        name: impl Into<String>,
        current_price: f64,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            asset_id: asset_id.into(),
            name: name.into(),
            image_url: String::new(),
            current_price,
            market_cap: None,
            total_volume: None,
            high_24h: None,
            low_24h: None,
            price_change_pct_24h: None,
            circulating_supply: None,
            total_supply: None,
            observed_at,
        }
    }

    pub fn key(&self) -> SnapshotKey {
        (self.asset_id.clone(), self.observed_at)
    }

    /// Seconds since the Unix epoch of `observed_at`, as a regression feature.
    pub fn epoch_seconds(&self) -> f64 {
        self.observed_at.timestamp_millis() as f64 / 1000.0
    }

    /// Copy of this snapshot re-stamped at `observed_at`.
    pub fn at(&self, observed_at: DateTime<Utc>) -> Self {
        Self {
            observed_at,
            ..self.clone()
        }
    }

    /// Field-by-field equality with a relative tolerance on numeric fields.
    pub fn approx_eq(&self, other: &Snapshot, rel_tol: f64) -> bool {
        fn close(a: f64, b: f64, tol: f64) -> bool {
            a == b || (a - b).abs() <= tol * a.abs().max(b.abs())
        }
        fn close_opt(a: Option<f64>, b: Option<f64>, tol: f64) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => close(a, b, tol),
                (None, None) => true,
                _ => false,
            }
        }

        self.asset_id == other.asset_id
            && self.name == other.name
            && self.image_url == other.image_url
            && self.observed_at == other.observed_at
            && close(self.current_price, other.current_price, rel_tol)
            && close_opt(self.market_cap, other.market_cap, rel_tol)
            && close_opt(self.total_volume, other.total_volume, rel_tol)
            && close_opt(self.high_24h, other.high_24h, rel_tol)
            && close_opt(self.low_24h, other.low_24h, rel_tol)
            && close_opt(self.price_change_pct_24h, other.price_change_pct_24h, rel_tol)
            && close_opt(self.circulating_supply, other.circulating_supply, rel_tol)
            && close_opt(self.total_supply, other.total_supply, rel_tol)
    }
}
