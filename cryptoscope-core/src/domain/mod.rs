//! Domain types for Cryptoscope

pub mod snapshot;

pub use snapshot::{Snapshot, SnapshotKey};

/// Asset identifier (upper-case ticker symbol, e.g. `BTC`).
pub type AssetId = String;
