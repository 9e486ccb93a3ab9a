//! TOML configuration for ingestion, storage and forecasting.
//!
//! Every field has a default, so an empty file (or no file at all) yields a working
//! configuration that talks to the public CoinGecko endpoint and stores data under
//! `./data`.

use crate::features::FeatureSet;
use crate::store::WriteMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub synthesis: SynthesisConfig,
    pub store: StoreConfig,
    pub forecast: ForecastConfig,
}

/// Market listing endpoint settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub currency: String,
    pub order: String,
    pub per_page: u32,
    pub page: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".into(),
            currency: "usd".into(),
            order: "market_cap_desc".into(),
            per_page: 10,
            page: 1,
            timeout_secs: 30,
            user_agent: concat!("cryptoscope/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Pseudo-history synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Hourly points generated per asset from one live snapshot.
    pub history_points: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self { history_points: 12 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub write_mode: WriteMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            write_mode: WriteMode::Replace,
        }
    }
}

/// Forecaster settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub feature_set: FeatureSet,
    /// Fewer usable rows than this is `insufficient_data`.
    pub min_rows: usize,
    /// Share of the most recent rows held out from the fit.
    pub test_fraction: f64,
    pub horizon_secs: i64,
    /// Only the most recent `max_rows` rows of an asset are fed to the fit.
    pub max_rows: usize,
    pub fit_timeout_ms: u64,
    /// Memoize forecasts until the asset's history changes.
    pub cache: bool,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            feature_set: FeatureSet::Timestamp,
            min_rows: 5,
            test_fraction: 0.2,
            horizon_secs: 3600,
            max_rows: 5000,
            fit_timeout_ms: 2000,
            cache: true,
        }
    }
}

impl AppConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.provider.per_page == 0 {
            return invalid("provider.per_page must be at least 1");
        }
        if self.provider.page == 0 {
            return invalid("provider.page is 1-based");
        }
        if self.synthesis.history_points == 0 {
            return invalid("synthesis.history_points must be at least 1");
        }
        let f = &self.forecast;
        if f.min_rows < 2 {
            return invalid("forecast.min_rows must be at least 2");
        }
        if !(0.0..1.0).contains(&f.test_fraction) {
            return invalid("forecast.test_fraction must lie in [0, 1)");
        }
        if f.horizon_secs <= 0 {
            return invalid("forecast.horizon_secs must be positive");
        }
        if f.max_rows < f.min_rows {
            return invalid("forecast.max_rows must be >= forecast.min_rows");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.synthesis.history_points, 12);
        assert_eq!(config.forecast.min_rows, 5);
        assert_eq!(config.forecast.horizon_secs, 3600);
        assert_eq!(config.store.write_mode, WriteMode::Replace);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [store]
            dir = "/var/lib/cryptoscope"
            write_mode = "merge"

            [forecast]
            feature_set = "market"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.dir, PathBuf::from("/var/lib/cryptoscope"));
        assert_eq!(config.store.write_mode, WriteMode::Merge);
        assert_eq!(config.forecast.feature_set, FeatureSet::Market);
        assert_eq!(config.forecast.test_fraction, 0.2);
        assert_eq!(config.provider.currency, "usd");
    }

    #[test]
    fn toml_roundtrip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for bad in [
            "[forecast]\ntest_fraction = 1.0",
            "[forecast]\nmin_rows = 1",
            "[forecast]\nmax_rows = 3",
            "[forecast]\nhorizon_secs = 0",
            "[provider]\nper_page = 0",
            "[synthesis]\nhistory_points = 0",
        ] {
            let result = AppConfig::from_toml(bad);
            assert!(
                matches!(result, Err(ConfigError::Invalid(_))),
                "expected rejection for {bad:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn unknown_write_mode_is_a_parse_error() {
        let result = AppConfig::from_toml("[store]\nwrite_mode = \"append_forever\"");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = AppConfig::from_file(Path::new("/nonexistent/cryptoscope.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cryptoscope.toml"));
    }
}
