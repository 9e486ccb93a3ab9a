//! CoinGecko market listing provider.
//!
//! Fetches the `/coins/markets` page: the top assets by market cap with their live
//! price, supply and 24h statistics. One request per ingestion cycle, no retries; a
//! failed cycle is retried by the next scheduled invocation.

use super::provider::{FetchError, ListingParams, MarketDataProvider};
use crate::config::ProviderConfig;
use crate::domain::Snapshot;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// One entry of the `/coins/markets` response.
///
/// Everything is optional at the serde level so that a missing required field is
/// reported with the entry index instead of a generic serde error.
#[derive(Debug, Deserialize)]
struct MarketEntry {
    symbol: Option<String>,
    name: Option<String>,
    image: Option<String>,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    high_24h: Option<f64>,
    low_24h: Option<f64>,
    price_change_percentage_24h: Option<f64>,
    circulating_supply: Option<f64>,
    total_supply: Option<f64>,
    last_updated: Option<String>,
}

/// CoinGecko data provider.
pub struct CoinGeckoProvider {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl CoinGeckoProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn markets_url(&self) -> String {
        format!("{}/coins/markets", self.base_url)
    }

    /// Parse a `/coins/markets` body into live snapshots.
    ///
    /// `fetched_at` stamps entries whose `last_updated` is missing or unparseable.
    pub fn parse_listing(body: &str, fetched_at: DateTime<Utc>) -> Result<Vec<Snapshot>, FetchError> {
        let entries: Vec<MarketEntry> = serde_json::from_str(body)
            .map_err(|e| FetchError::Parse(format!("expected a JSON array of assets: {e}")))?;

        entries
            .into_iter()
            .enumerate()
            .map(|(i, entry)| Self::parse_entry(i, entry, fetched_at))
            .collect()
    }

    fn parse_entry(
        index: usize,
        entry: MarketEntry,
        fetched_at: DateTime<Utc>,
    ) -> Result<Snapshot, FetchError> {
        let missing = |field: &str| FetchError::Parse(format!("entry {index}: missing '{field}'"));

        let symbol = entry
            .symbol
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| missing("symbol"))?;
        let name = entry.name.ok_or_else(|| missing("name"))?;
        let current_price = entry
            .current_price
            .filter(|p| p.is_finite())
            .ok_or_else(|| missing("current_price"))?;

        let observed_at = entry
            .last_updated
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(fetched_at);

        Ok(Snapshot {
            asset_id: symbol.trim().to_uppercase(),
            name,
            image_url: entry.image.unwrap_or_default(),
            current_price,
            market_cap: entry.market_cap,
            total_volume: entry.total_volume,
            high_24h: entry.high_24h,
            low_24h: entry.low_24h,
            price_change_pct_24h: entry.price_change_percentage_24h,
            circulating_supply: entry.circulating_supply,
            total_supply: entry.total_supply,
            observed_at,
        })
    }
}

impl MarketDataProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        "coingecko"
    }

    fn fetch_listing(&self, params: &ListingParams) -> Result<Vec<Snapshot>, FetchError> {
        let url = self.markets_url();
        debug!(url = %url, page = params.page, per_page = params.per_page, "requesting listing");

        let resp = self
            .client
            .get(&url)
            .query(&params.query_pairs())
            .send()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unspecified")
                .to_string();
            warn!(retry_after = %retry_after, "provider rate limit hit");
            return Err(FetchError::Network(format!(
                "rate limited by provider (retry after {retry_after}s)"
            )));
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {status} from {url}")));
        }

        let body = resp
            .text()
            .map_err(|e| FetchError::Network(format!("reading response body: {e}")))?;

        Self::parse_listing(&body, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fetched_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    const SAMPLE: &str = r#"[
        {
            "id": "bitcoin",
            "symbol": "btc",
            "name": "Bitcoin",
            "image": "https://assets.coingecko.com/coins/images/1/large/bitcoin.png",
            "current_price": 64012.5,
            "market_cap": 1261000000000,
            "total_volume": 28000000000,
            "high_24h": 64800.0,
            "low_24h": 62900.0,
            "price_change_percentage_24h": 1.42,
            "circulating_supply": 19690000.0,
            "total_supply": 21000000.0,
            "last_updated": "2024-05-01T11:58:31.112Z"
        },
        {
            "id": "tether",
            "symbol": "usdt",
            "name": "Tether",
            "image": "https://assets.coingecko.com/coins/images/325/large/Tether.png",
            "current_price": 1.0,
            "market_cap": 110000000000,
            "total_volume": 50000000000,
            "high_24h": 1.002,
            "low_24h": 0.998,
            "price_change_percentage_24h": null,
            "circulating_supply": 110000000000.0,
            "total_supply": null,
            "last_updated": null
        }
    ]"#;

    #[test]
    fn parses_listing_and_normalizes_symbols() {
        let snaps = CoinGeckoProvider::parse_listing(SAMPLE, fetched_at()).unwrap();
        assert_eq!(snaps.len(), 2);

        let btc = &snaps[0];
        assert_eq!(btc.asset_id, "BTC");
        assert_eq!(btc.name, "Bitcoin");
        assert_eq!(btc.current_price, 64012.5);
        assert_eq!(btc.market_cap, Some(1.261e12));
        assert_eq!(btc.total_supply, Some(21_000_000.0));
        assert_eq!(
            btc.observed_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 11, 58, 31).unwrap()
                + chrono::Duration::milliseconds(112)
        );

        let usdt = &snaps[1];
        assert_eq!(usdt.asset_id, "USDT");
        assert_eq!(usdt.price_change_pct_24h, None);
        assert_eq!(usdt.total_supply, None);
        assert_eq!(usdt.observed_at, fetched_at());
    }

    #[test]
    fn object_body_is_a_parse_error() {
        let body = r#"{"status":{"error_code":429,"error_message":"rate limited"}}"#;
        let result = CoinGeckoProvider::parse_listing(body, fetched_at());
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[test]
    fn missing_price_names_the_entry() {
        let body = r#"[
            {"symbol": "btc", "name": "Bitcoin", "current_price": 1.0},
            {"symbol": "eth", "name": "Ethereum"}
        ]"#;
        match CoinGeckoProvider::parse_listing(body, fetched_at()) {
            Err(FetchError::Parse(msg)) => {
                assert!(msg.contains("entry 1"), "{msg}");
                assert!(msg.contains("current_price"), "{msg}");
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn blank_symbol_is_rejected() {
        let body = r#"[{"symbol": "  ", "name": "Nothing", "current_price": 1.0}]"#;
        let result = CoinGeckoProvider::parse_listing(body, fetched_at());
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[test]
    fn empty_array_parses_to_empty_listing() {
        let snaps = CoinGeckoProvider::parse_listing("[]", fetched_at()).unwrap();
        assert!(snaps.is_empty());
    }

    #[test]
    fn markets_url_strips_trailing_slash() {
        let config = ProviderConfig {
            base_url: "http://localhost:9999/api/v3/".into(),
            ..ProviderConfig::default()
        };
        let provider = CoinGeckoProvider::new(&config).unwrap();
        assert_eq!(provider.markets_url(), "http://localhost:9999/api/v3/coins/markets");
    }

    #[test]
    fn unreachable_host_is_a_network_error() {
        let config = ProviderConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout_secs: 2,
            ..ProviderConfig::default()
        };
        let provider = CoinGeckoProvider::new(&config).unwrap();
        let result = provider.fetch_listing(&ListingParams::default());
        assert!(matches!(result, Err(FetchError::Network(_))));
    }
}
