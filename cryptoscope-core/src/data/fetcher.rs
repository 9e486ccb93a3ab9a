//! Fetcher: one ingestion cycle's worth of snapshots.
//!
//! Wraps a provider, synthesizes pseudo-history, and folds every failure into
//! `FetchOutcome::NoData` so nothing escapes the fetch boundary.

use super::provider::{FetchError, ListingParams, MarketDataProvider};
use super::synth::synthesize_history;
use crate::domain::Snapshot;
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, warn};

/// Why a cycle produced nothing to store.
#[derive(Debug, Clone, PartialEq)]
pub enum NoDataReason {
    Fetch(FetchError),
    EmptyListing,
}

impl std::fmt::Display for NoDataReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoDataReason::Fetch(e) => write!(f, "{e}"),
            NoDataReason::EmptyListing => write!(f, "provider returned an empty listing"),
        }
    }
}

/// Result of a fetch. `NoData` means "skip this ingestion cycle".
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Batch(Vec<Snapshot>),
    NoData(NoDataReason),
}

impl FetchOutcome {
    pub fn into_batch(self) -> Option<Vec<Snapshot>> {
        match self {
            FetchOutcome::Batch(b) => Some(b),
            FetchOutcome::NoData(_) => None,
        }
    }
}

pub struct Fetcher {
    provider: Box<dyn MarketDataProvider>,
    params: ListingParams,
    history_points: u32,
}

impl Fetcher {
    pub fn new(provider: Box<dyn MarketDataProvider>, params: ListingParams, history_points: u32) -> Self {
        Self {
            provider,
            params,
            history_points,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Fetch a batch anchored at the current time (whole seconds).
    pub fn fetch(&self) -> FetchOutcome {
        self.fetch_at(Utc::now().trunc_subsecs(0))
    }

    /// Fetch a batch whose most recent synthesized point is `anchor`.
    pub fn fetch_at(&self, anchor: DateTime<Utc>) -> FetchOutcome {
        let live = match self.provider.fetch_listing(&self.params) {
            Ok(live) => live,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "fetch failed, no data this cycle");
                return FetchOutcome::NoData(NoDataReason::Fetch(e));
            }
        };

        if live.is_empty() {
            warn!(provider = self.provider.name(), "empty listing, no data this cycle");
            return FetchOutcome::NoData(NoDataReason::EmptyListing);
        }

        let batch = synthesize_history(&live, self.history_points, anchor);
        info!(
            provider = self.provider.name(),
            assets = live.len(),
            rows = batch.len(),
            "fetched listing"
        );
        FetchOutcome::Batch(batch)
    }
}
