//! Pseudo-history synthesis from a single live listing.
//!
//! The listing endpoint only reports the current moment. To give the forecaster
//! something to fit, each live snapshot is replicated at hourly offsets before an
//! anchor instant with a small deterministic price perturbation.

use crate::domain::Snapshot;
use chrono::{DateTime, Duration, Utc};

/// Price multiplier for the point `offset` hours before the anchor.
pub fn perturbation(offset: u32) -> f64 {
    1.0 + f64::from(offset % 5) / 100.0
}

/// Expand `live` into `points` hourly observations per asset ending at `anchor`.
///
/// Rows are grouped by offset: every asset at the anchor first (in listing order),
/// then every asset one hour earlier, and so on. Only `current_price` is perturbed.
pub fn synthesize_history(live: &[Snapshot], points: u32, anchor: DateTime<Utc>) -> Vec<Snapshot> {
    let mut batch = Vec::with_capacity(live.len() * points as usize);
    for offset in 0..points {
        let observed_at = anchor - Duration::hours(i64::from(offset));
        let factor = perturbation(offset);
        batch.extend(live.iter().map(|snap| {
            let mut row = snap.at(observed_at);
            row.current_price *= factor;
            row
        }));
    }
    batch
}
