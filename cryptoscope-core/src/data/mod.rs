//! Market data acquisition: provider boundary, history synthesis, fetch cycle.

pub mod coingecko;
pub mod fetcher;
pub mod provider;
pub mod synth;

pub use coingecko::CoinGeckoProvider;
pub use fetcher::{FetchOutcome, Fetcher, NoDataReason};
pub use provider::{FetchError, ListingParams, MarketDataProvider, StaticProvider};
pub use synth::synthesize_history;
