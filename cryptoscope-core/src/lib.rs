//! Cryptoscope Core: market snapshot ingestion, storage and per-asset forecasting.
//!
//! - Domain types (snapshots keyed by asset and observation time)
//! - Fetcher over a pluggable market-data provider, with pseudo-history synthesis
//! - Atomic snapshot store (in-memory or Parquet) with replace and merge modes
//! - Feature builder and OLS forecaster with a chronological holdout
//! - Data access views and the `MarketService` facade consumed by front ends

pub mod config;
pub mod data;
pub mod domain;
pub mod features;
pub mod forecast;
pub mod service;
pub mod store;
pub mod views;

pub use config::AppConfig;
pub use domain::Snapshot;
pub use forecast::{Forecast, ForecastError, ForecastOutcome, Forecaster};
pub use service::{IngestReport, MarketService};
pub use store::{MemoryStore, ParquetStore, SnapshotStore, StoreError, WriteMode};
