//! Market data provider trait and structured fetch errors.
//!
//! The MarketDataProvider trait abstracts over listing sources (CoinGecko, fixtures)
//! so the fetcher can be exercised without network access.

use crate::config::ProviderConfig;
use crate::domain::Snapshot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fetch failures. Both kinds abort the ingestion cycle and leave the store untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("malformed provider response: {0}")]
    Parse(String),
}

/// Query parameters for a market listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingParams {
    pub currency: String,
    pub order: String,
    pub per_page: u32,
    pub page: u32,
}

impl ListingParams {
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self {
            currency: config.currency.clone(),
            order: config.order.clone(),
            per_page: config.per_page,
            page: config.page,
        }
    }

    /// Query string pairs in provider order. Sparklines are never requested and the
    /// price change window is fixed at 24h.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("vs_currency", self.currency.clone()),
            ("order", self.order.clone()),
            ("per_page", self.per_page.to_string()),
            ("page", self.page.to_string()),
            ("sparkline", "false".to_string()),
            ("price_change_percentage", "24h".to_string()),
        ]
    }
}

impl Default for ListingParams {
    fn default() -> Self {
        Self::from_config(&ProviderConfig::default())
    }
}

/// Trait for market listing sources.
///
/// Implementations return the live snapshot of each listed asset; history synthesis
/// happens above this trait.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch one listing page.
    fn fetch_listing(&self, params: &ListingParams) -> Result<Vec<Snapshot>, FetchError>;
}

/// Provider that serves a fixed listing, or a fixed error. Used for offline runs and tests.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    response: Result<Vec<Snapshot>, FetchError>,
}

impl StaticProvider {
    pub fn new(snapshots: Vec<Snapshot>) -> Self {
        Self {
            response: Ok(snapshots),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        Self {
            response: Err(error),
        }
    }
}

impl MarketDataProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch_listing(&self, _params: &ListingParams) -> Result<Vec<Snapshot>, FetchError> {
        self.response.clone()
    }
}
