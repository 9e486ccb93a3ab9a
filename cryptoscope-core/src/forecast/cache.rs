//! Forecast memoization between ingestion cycles.

use super::Forecast;
use crate::features::FeatureMatrix;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

/// Identity of the history a forecast was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub asset_id: String,
    pub latest_observed_at: DateTime<Utc>,
    /// blake3 over the feature matrix and targets, so a rewritten row with the same
    /// timestamp still misses.
    pub fingerprint: blake3::Hash,
}

impl CacheKey {
    pub fn for_features(m: &FeatureMatrix) -> Option<Self> {
        let mut hasher = blake3::Hasher::new();
        for v in m.x.iter().chain(m.y.iter()) {
            hasher.update(&v.to_le_bytes());
        }
        Some(Self {
            asset_id: m.asset_id.clone(),
            latest_observed_at: m.latest_observed_at()?,
            fingerprint: hasher.finalize(),
        })
    }
}

/// Bounded map from history identity to forecast. Cleared wholesale when full.
#[derive(Debug)]
pub struct ForecastCache {
    entries: Mutex<HashMap<CacheKey, Forecast>>,
    capacity: usize,
}

impl ForecastCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// A poisoned lock reads as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Forecast> {
        let hit = self.entries.lock().ok()?.get(key).cloned();
        if hit.is_some() {
            debug!(asset_id = %key.asset_id, "forecast cache hit");
        }
        hit
    }

    pub fn insert(&self, key: CacheKey, forecast: Forecast) {
        if let Ok(mut entries) = self.entries.lock() {
            if entries.len() >= self.capacity && !entries.contains_key(&key) {
                entries.clear();
            }
            entries.insert(key, forecast);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ForecastCache {
    fn default() -> Self {
        Self::new(1024)
    }
}
