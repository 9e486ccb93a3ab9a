//! Cryptoscope CLI: ingestion, store views and forecasts.
//!
//! Commands:
//! - `ingest`: fetch the market listing, synthesize history and commit the batch
//! - `rows`: every stored snapshot ordered by time
//! - `latest`: one snapshot per asset
//! - `trend`: mean price per time bucket and asset name, optionally as CSV
//! - `forecast`: next-hour price per asset
//! - `config init` / `config show`: write or print the TOML configuration
//!
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use cryptoscope_core::data::{CoinGeckoProvider, Fetcher, ListingParams};
use cryptoscope_core::views::Granularity;
use cryptoscope_core::{AppConfig, IngestReport, MarketService, ParquetStore, SnapshotStore};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cryptoscope",
    about = "Cryptoscope CLI: crypto market snapshots and next-hour forecasts"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one ingestion cycle against the configured provider.
    Ingest,
    /// Print every stored snapshot, oldest first.
    Rows {
        /// Only rows for this asset symbol.
        #[arg(long)]
        asset: Option<String>,
    },
    /// Print one snapshot per asset.
    Latest,
    /// Print mean price per time bucket for every asset name.
    Trend {
        /// Bucket width: raw, minute, hour, day.
        #[arg(long, default_value = "raw")]
        granularity: Granularity,

        /// Also write the table as wide CSV to this path.
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Forecast the next-hour price for the given assets, or all of them.
    Forecast {
        /// Asset symbols (e.g., BTC ETH).
        #[arg(conflicts_with = "all")]
        assets: Vec<String>,

        /// Forecast every stored asset.
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Configuration file commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration to a file.
    Init {
        /// Destination file.
        #[arg(default_value = "cryptoscope.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the effective configuration as TOML.
    Show,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init { path, force } => run_config_init(path, *force),
            ConfigAction::Show => run_config_show(cli.config.as_deref()),
        };
    }

    let config = load_config(cli.config.as_deref())?;
    let service = open_service(&config);

    match cli.command {
        Commands::Ingest => run_ingest(&service, &config),
        Commands::Rows { asset } => run_rows(&service, asset.as_deref()),
        Commands::Latest => print_json(&service.latest_per_asset()?),
        Commands::Trend { granularity, csv } => run_trend(&service, granularity, csv.as_deref()),
        Commands::Forecast { assets, all } => run_forecast(&service, &assets, all),
        Commands::Config { .. } => Ok(()),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load_or_default(path).with_context(|| match path {
        Some(p) => format!("failed to load config from {}", p.display()),
        None => "failed to build default config".to_string(),
    })
}

fn open_service(config: &AppConfig) -> MarketService<ParquetStore> {
    let store = ParquetStore::new(&config.store.dir, config.store.write_mode);
    MarketService::with_config(store, &config.forecast)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}

fn run_ingest(service: &MarketService<ParquetStore>, config: &AppConfig) -> Result<()> {
    let provider =
        CoinGeckoProvider::new(&config.provider).context("failed to build market data client")?;
    let fetcher = Fetcher::new(
        Box::new(provider),
        ListingParams::from_config(&config.provider),
        config.synthesis.history_points,
    );

    info!(
        provider = fetcher.provider_name(),
        store = %service.store().dir().display(),
        "starting ingestion cycle"
    );
    let report = service
        .ingest(&fetcher)
        .context("failed to commit ingested batch")?;
    if let IngestReport::Skipped { reason } = &report {
        eprintln!("No data this cycle: {reason}");
    }
    print_json(&report)
}

fn run_rows(service: &MarketService<ParquetStore>, asset: Option<&str>) -> Result<()> {
    let rows = match asset {
        Some(id) => service
            .store()
            .read_asset(&id.to_ascii_uppercase())
            .with_context(|| format!("failed to read rows for {id}"))?,
        None => service.fetch_all().context("failed to read store")?,
    };
    print_json(&rows)
}

fn run_trend(
    service: &MarketService<ParquetStore>,
    granularity: Granularity,
    csv_path: Option<&Path>,
) -> Result<()> {
    let table = service
        .aggregate_by_time(granularity)
        .context("failed to read store")?;

    if let Some(path) = csv_path {
        let csv = table.to_csv().context("failed to render trend CSV")?;
        std::fs::write(path, csv)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), series = table.series.len(), "wrote trend CSV");
    }
    print_json(&table)
}

fn run_forecast(service: &MarketService<ParquetStore>, assets: &[String], all: bool) -> Result<()> {
    let outcomes = if all || assets.is_empty() {
        service.forecast_all().context("forecast failed")?
    } else {
        assets
            .iter()
            .map(|id| {
                let id = id.to_ascii_uppercase();
                service
                    .forecast(&id)
                    .with_context(|| format!("forecast failed for {id}"))
            })
            .collect::<Result<Vec<_>>>()?
    };
    print_json(&outcomes)
}

fn run_config_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    let toml = AppConfig::default()
        .to_toml()
        .context("failed to render default config")?;
    std::fs::write(path, toml).with_context(|| format!("failed to write {}", path.display()))?;
    print_json(&json!({ "written": path.display().to_string() }))
}

fn run_config_show(path: Option<&Path>) -> Result<()> {
    let config = load_config(path)?;
    let toml = config.to_toml().context("failed to render config")?;
    print!("{toml}");
    Ok(())
}
