//! Consumer-facing facade over a snapshot store.
//!
//! Presentation layers (CLI, dashboards) only talk to `MarketService`; they never see
//! the store or the forecaster directly.

use crate::config::ForecastConfig;
use crate::data::{FetchOutcome, Fetcher};
use crate::domain::Snapshot;
use crate::forecast::{ForecastError, ForecastOutcome, Forecaster};
use crate::store::{SnapshotStore, StoreError, WriteSummary};
use crate::views::{self, Granularity, TrendTable};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// What one ingestion cycle did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestReport {
    Committed(WriteSummary),
    /// The fetcher produced no data; the store was not touched.
    Skipped { reason: String },
}

pub struct MarketService<S> {
    store: S,
    forecaster: Forecaster,
}

impl<S: SnapshotStore> MarketService<S> {
    pub fn new(store: S, forecaster: Forecaster) -> Self {
        Self { store, forecaster }
    }

    pub fn with_config(store: S, config: &ForecastConfig) -> Self {
        Self::new(store, Forecaster::from_config(config))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one ingestion cycle: fetch, then commit the batch if there is one.
    pub fn ingest(&self, fetcher: &Fetcher) -> Result<IngestReport, StoreError> {
        self.commit(fetcher.fetch())
    }

    /// Like [`ingest`](Self::ingest) with a fixed synthesis anchor.
    pub fn ingest_at(&self, fetcher: &Fetcher, anchor: DateTime<Utc>) -> Result<IngestReport, StoreError> {
        self.commit(fetcher.fetch_at(anchor))
    }

    fn commit(&self, outcome: FetchOutcome) -> Result<IngestReport, StoreError> {
        match outcome {
            FetchOutcome::Batch(batch) => Ok(IngestReport::Committed(self.store.write(&batch)?)),
            FetchOutcome::NoData(reason) => {
                info!(%reason, "ingestion cycle skipped");
                Ok(IngestReport::Skipped {
                    reason: reason.to_string(),
                })
            }
        }
    }

    /// Every stored row ascending by `observed_at`; ties keep store order.
    pub fn fetch_all(&self) -> Result<Vec<Snapshot>, StoreError> {
        let mut rows = self.store.read_all()?;
        rows.sort_by_key(|s| s.observed_at);
        Ok(rows)
    }

    pub fn latest_per_asset(&self) -> Result<BTreeMap<String, Snapshot>, StoreError> {
        Ok(views::latest_per_asset(&self.store.read_all()?))
    }

    pub fn aggregate_by_time(&self, granularity: Granularity) -> Result<TrendTable, StoreError> {
        Ok(views::aggregate_by_time(&self.store.read_all()?, granularity))
    }

    /// Forecast one asset one horizon past its latest observation.
    ///
    /// An unknown asset or a short history is `InsufficientData`, not an error.
    pub fn forecast(&self, asset_id: &str) -> Result<ForecastOutcome, ForecastError> {
        let rows = self.store.read_asset(asset_id)?;
        self.forecaster.forecast(&rows, asset_id)
    }

    /// Forecast every stored asset from a single read of the table.
    pub fn forecast_all(&self) -> Result<Vec<ForecastOutcome>, ForecastError> {
        let rows = self.store.read_all()?;
        views::latest_per_asset(&rows)
            .keys()
            .map(|asset_id| self.forecaster.forecast(&rows, asset_id))
            .collect()
    }
}
