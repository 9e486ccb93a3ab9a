//! Per-asset one-step-ahead price forecasting.
//!
//! Every call recomputes from the rows it is given: build features, split the
//! history chronologically, fit OLS on the older part, and evaluate the model one
//! horizon past the most recent observation. The only state is the optional cache.

pub mod cache;
pub mod ols;
pub mod split;

pub use cache::{CacheKey, ForecastCache};
pub use ols::{fit, Deadline, ForecastModel};
pub use split::{ChronologicalSplit, SplitSizes};

use crate::config::ForecastConfig;
use crate::domain::Snapshot;
use crate::features::{FeatureBuilder, FeatureMatrix, FeatureOutcome, FeatureSet, TIME_COLUMN};
use crate::store::StoreError;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("reading history: {0}")]
    Store(#[from] StoreError),

    #[error("fit exceeded its time budget after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("feature matrix has {rows} rows but {targets} targets")]
    DimensionMismatch { rows: usize, targets: usize },
}

/// A successful prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub asset_id: String,
    pub predicted_price: f64,
    pub latest_observed_at: DateTime<Utc>,
    /// `latest_observed_at` plus the horizon.
    pub target_time: DateTime<Utc>,
    pub feature_set: FeatureSet,
    pub train_rows: usize,
    pub test_rows: usize,
    /// RMSE of the fitted model on the held-out rows.
    pub holdout_rmse: Option<f64>,
}

/// Result of a forecast request. `InsufficientData` is a normal, renderable outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Ok(Forecast),
    InsufficientData { asset_id: String, rows: usize },
}

impl ForecastOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ForecastOutcome::Ok(_) => "ok",
            ForecastOutcome::InsufficientData { .. } => "insufficient_data",
        }
    }

    pub fn predicted_price(&self) -> Option<f64> {
        match self {
            ForecastOutcome::Ok(f) => Some(f.predicted_price),
            ForecastOutcome::InsufficientData { .. } => None,
        }
    }

    pub fn asset_id(&self) -> &str {
        match self {
            ForecastOutcome::Ok(f) => &f.asset_id,
            ForecastOutcome::InsufficientData { asset_id, .. } => asset_id,
        }
    }
}

pub struct Forecaster {
    builder: FeatureBuilder,
    test_fraction: f64,
    horizon: Duration,
    fit_timeout: Option<std::time::Duration>,
    cache: Option<ForecastCache>,
}

impl Forecaster {
    pub fn from_config(config: &ForecastConfig) -> Self {
        Self {
            builder: FeatureBuilder::new(config.feature_set, config.min_rows, config.max_rows),
            test_fraction: config.test_fraction,
            horizon: Duration::seconds(config.horizon_secs),
            fit_timeout: (config.fit_timeout_ms > 0)
                .then(|| std::time::Duration::from_millis(config.fit_timeout_ms)),
            cache: config.cache.then(ForecastCache::default),
        }
    }

    pub fn feature_builder(&self) -> &FeatureBuilder {
        &self.builder
    }

    pub fn cache(&self) -> Option<&ForecastCache> {
        self.cache.as_ref()
    }

    /// Forecast `asset_id` from store rows (any order, any assets).
    pub fn forecast(&self, rows: &[Snapshot], asset_id: &str) -> Result<ForecastOutcome, ForecastError> {
        match self.builder.build(rows, asset_id) {
            FeatureOutcome::InsufficientData { asset_id, rows } => {
                debug!(asset_id = %asset_id, rows, "insufficient history");
                Ok(ForecastOutcome::InsufficientData { asset_id, rows })
            }
            FeatureOutcome::Ready(features) => self.forecast_features(&features),
        }
    }

    /// Forecast from an already built feature matrix, consulting the cache.
    pub fn forecast_features(&self, features: &FeatureMatrix) -> Result<ForecastOutcome, ForecastError> {
        let key = self.cache.as_ref().and_then(|_| CacheKey::for_features(features));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(hit) = cache.get(key) {
                return Ok(ForecastOutcome::Ok(hit));
            }
        }

        let outcome = self.predict(features)?;
        if let (Some(cache), Some(key), ForecastOutcome::Ok(forecast)) = (&self.cache, key, &outcome) {
            cache.insert(key, forecast.clone());
        }
        Ok(outcome)
    }

    /// The pure part: split, fit, extrapolate one horizon.
    fn predict(&self, features: &FeatureMatrix) -> Result<ForecastOutcome, ForecastError> {
        let insufficient = || ForecastOutcome::InsufficientData {
            asset_id: features.asset_id.clone(),
            rows: features.len(),
        };
        let Some(latest_observed_at) = features.latest_observed_at() else {
            return Ok(insufficient());
        };

        let deadline = match self.fit_timeout {
            Some(limit) => Deadline::after(limit),
            None => Deadline::unbounded(),
        };

        let sizes = SplitSizes::new(features.len(), self.test_fraction);
        let halves = ChronologicalSplit::new(features.x.view(), features.y.view(), sizes);
        let model = fit(halves.x_train, halves.y_train, &deadline)?;

        let holdout_rmse = split::rmse(halves.y_test, &model.predict(halves.x_test));

        let mut next = features.x.row(features.len() - 1).to_owned();
        next[TIME_COLUMN] += self.horizon.num_milliseconds() as f64 / 1000.0;
        let predicted_price = model.predict_one(next.view());

        if !predicted_price.is_finite() {
            return Ok(insufficient());
        }

        debug!(
            asset_id = %features.asset_id,
            train = sizes.train,
            test = sizes.test,
            predicted_price,
            "fitted forecast"
        );

        Ok(ForecastOutcome::Ok(Forecast {
            asset_id: features.asset_id.clone(),
            predicted_price,
            latest_observed_at,
            target_time: latest_observed_at + self.horizon,
            feature_set: self.builder.feature_set,
            train_rows: sizes.train,
            test_rows: sizes.test,
            holdout_rmse,
        }))
    }
}

impl Default for Forecaster {
    fn default() -> Self {
        Self::from_config(&ForecastConfig::default())
    }
}
