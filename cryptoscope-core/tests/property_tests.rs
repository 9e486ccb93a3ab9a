//! Property tests for pipeline invariants.
//!
//! Uses proptest to verify:
//! 1. Split sizes partition the history and always leave a training row
//! 2. Synthesized history yields strictly increasing feature timestamps
//! 3. Short histories are insufficient data, never errors
//! 4. `latest_per_asset` has one entry per distinct asset
//! 5. OLS recovers a noiseless linear trend at epoch scale

use chrono::{DateTime, Duration, TimeZone, Utc};
use cryptoscope_core::config::ForecastConfig;
use cryptoscope_core::data::synthesize_history;
use cryptoscope_core::features::{FeatureBuilder, FeatureOutcome, FeatureSet};
use cryptoscope_core::forecast::SplitSizes;
use cryptoscope_core::views::latest_per_asset;
use cryptoscope_core::{ForecastOutcome, Forecaster, Snapshot};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ── Strategies (proptest) ────────────────────────────────────────────

fn anchor() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn arb_price() -> impl Strategy<Value = f64> {
    (0.0001..100_000.0_f64).prop_map(|p| (p * 10_000.0).round() / 10_000.0)
}

fn arb_symbol() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["BTC", "ETH", "SOL", "XRP", "DOGE", "ADA"]).prop_map(String::from)
}

fn arb_rows() -> impl Strategy<Value = Vec<Snapshot>> {
    prop::collection::vec((arb_symbol(), arb_price(), 0i64..500), 0..60).prop_map(|rows| {
        rows.into_iter()
            .map(|(sym, price, minutes)| {
                Snapshot::new(sym.clone(), sym, price, anchor() - Duration::minutes(minutes))
            })
            .collect()
    })
}

fn uncached() -> Forecaster {
    Forecaster::from_config(&ForecastConfig {
        cache: false,
        ..ForecastConfig::default()
    })
}

proptest! {
    // ── 1. Split sizes ──────────────────────────────────────────────

    #[test]
    fn split_partitions_history(n in 1usize..10_000, fraction in 0.0..0.99_f64) {
        let sizes = SplitSizes::new(n, fraction);
        prop_assert_eq!(sizes.train + sizes.test, n);
        prop_assert!(sizes.train >= 1);
        prop_assert!(sizes.test as f64 + 1.0 >= (n as f64 * fraction).min((n - 1) as f64));
    }

    // ── 2. Synthesized history ordering ─────────────────────────────

    #[test]
    fn synthesized_history_is_strictly_increasing(price in arb_price(), points in 1u32..48) {
        let live = vec![Snapshot::new("BTC", "Bitcoin", price, anchor())];
        let batch = synthesize_history(&live, points, anchor());
        prop_assert_eq!(batch.len(), points as usize);

        let builder = FeatureBuilder::new(FeatureSet::Timestamp, 1, 5000);
        match builder.build(&batch, "BTC") {
            FeatureOutcome::Ready(m) => {
                prop_assert_eq!(m.len(), points as usize);
                prop_assert!(m.timestamps.windows(2).all(|w| w[0] < w[1]));
                prop_assert_eq!(m.latest_observed_at(), Some(anchor()));
            }
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    // ── 3. Insufficient data ────────────────────────────────────────

    #[test]
    fn short_history_is_never_an_error(prices in prop::collection::vec(arb_price(), 0..5)) {
        let rows: Vec<Snapshot> = prices
            .iter()
            .enumerate()
            .map(|(i, &p)| Snapshot::new("BTC", "Bitcoin", p, anchor() - Duration::hours(i as i64)))
            .collect();
        let outcome = uncached().forecast(&rows, "BTC").unwrap();
        let is_insufficient = matches!(
            outcome,
            ForecastOutcome::InsufficientData { rows, .. } if rows == prices.len()
        );
        prop_assert!(is_insufficient);
    }

    // ── 4. Distinctness ─────────────────────────────────────────────

    #[test]
    fn latest_per_asset_is_distinct(rows in arb_rows()) {
        let latest = latest_per_asset(&rows);
        let distinct: BTreeSet<&str> = rows.iter().map(|s| s.asset_id.as_str()).collect();
        prop_assert_eq!(latest.len(), distinct.len());
        for (id, snap) in &latest {
            let first = rows.iter().find(|s| &s.asset_id == id);
            prop_assert_eq!(Some(snap), first);
        }
    }

    // ── 5. Linear trend recovery ────────────────────────────────────

    #[test]
    fn linear_trend_is_extrapolated(
        base in 1.0..50_000.0_f64,
        slope in -5.0..5.0_f64,
        n in 5i64..60,
    ) {
        let rows: Vec<Snapshot> = (0..n)
            .map(|i| {
                let t = anchor() - Duration::hours(n - 1 - i);
                Snapshot::new("ETH", "Ethereum", base + slope * i as f64, t)
            })
            .collect();
        let outcome = uncached().forecast(&rows, "ETH").unwrap();
        let predicted = outcome.predicted_price();
        prop_assert!(predicted.is_some());
        let expected = base + slope * n as f64;
        let err = (predicted.unwrap_or(f64::NAN) - expected).abs();
        prop_assert!(err <= 1e-6 * expected.abs().max(1.0), "err {} at n {}", err, n);
    }
}
