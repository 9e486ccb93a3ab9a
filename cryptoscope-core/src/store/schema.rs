//! Persisted schema of the `cryptocurrency_data` table and DataFrame conversion.

use super::StoreError;
use crate::domain::Snapshot;
use chrono::DateTime;
use polars::prelude::*;

pub const TABLE_NAME: &str = "cryptocurrency_data";

pub const SYMBOL: &str = "symbol";
pub const NAME: &str = "name";
pub const IMAGE: &str = "image";
pub const CURRENT_PRICE: &str = "current_price";
pub const MARKET_CAP: &str = "market_cap";
pub const TOTAL_VOLUME: &str = "total_volume";
pub const HIGH_24H: &str = "high_24h";
pub const LOW_24H: &str = "low_24h";
pub const PRICE_CHANGE_PCT_24H: &str = "price_change_percentage_24h";
pub const CIRCULATING_SUPPLY: &str = "circulating_supply";
pub const TOTAL_SUPPLY: &str = "total_supply";
pub const LAST_UPDATED: &str = "last_updated";

const FLOAT_COLUMNS: [&str; 8] = [
    CURRENT_PRICE,
    MARKET_CAP,
    TOTAL_VOLUME,
    HIGH_24H,
    LOW_24H,
    PRICE_CHANGE_PCT_24H,
    CIRCULATING_SUPPLY,
    TOTAL_SUPPLY,
];

/// Expected schema for snapshot tables.
pub struct SnapshotSchema;

impl SnapshotSchema {
    pub fn schema() -> Schema {
        let mut fields = vec![
            Field::new(SYMBOL.into(), DataType::String),
            Field::new(NAME.into(), DataType::String),
            Field::new(IMAGE.into(), DataType::String),
        ];
        fields.extend(
            FLOAT_COLUMNS
                .iter()
                .map(|c| Field::new((*c).into(), DataType::Float64)),
        );
        fields.push(Field::new(
            LAST_UPDATED.into(),
            DataType::Datetime(TimeUnit::Milliseconds, None),
        ));
        Schema::from_iter(fields)
    }

    /// Check that all columns exist with the expected types.
    ///
    /// The timestamp column only needs millisecond precision; its time zone tag is
    /// ignored and values are read as UTC.
    pub fn validate(df: &DataFrame) -> Result<(), StoreError> {
        let expected = Self::schema();
        let actual = df.schema();

        for field in expected.iter_fields() {
            let actual_dtype = actual
                .get(field.name())
                .ok_or_else(|| StoreError::Schema(format!("missing column '{}'", field.name())))?;

            let matches = match field.dtype() {
                DataType::Datetime(unit, _) => {
                    matches!(actual_dtype, DataType::Datetime(u, _) if u == unit)
                }
                dtype => actual_dtype == dtype,
            };
            if !matches {
                return Err(StoreError::Schema(format!(
                    "column '{}': expected {:?}, got {:?}",
                    field.name(),
                    field.dtype(),
                    actual_dtype
                )));
            }
        }
        Ok(())
    }
}

/// Convert snapshots to a DataFrame in the persisted column layout.
pub fn snapshots_to_dataframe(rows: &[Snapshot]) -> Result<DataFrame, StoreError> {
    let symbols: Vec<&str> = rows.iter().map(|s| s.asset_id.as_str()).collect();
    let names: Vec<&str> = rows.iter().map(|s| s.name.as_str()).collect();
    let images: Vec<&str> = rows.iter().map(|s| s.image_url.as_str()).collect();
    let prices: Vec<f64> = rows.iter().map(|s| s.current_price).collect();
    let optional = |f: fn(&Snapshot) -> Option<f64>| -> Vec<Option<f64>> { rows.iter().map(f).collect() };
    let millis: Vec<i64> = rows.iter().map(|s| s.observed_at.timestamp_millis()).collect();

    DataFrame::new(vec![
        Column::new(SYMBOL.into(), symbols),
        Column::new(NAME.into(), names),
        Column::new(IMAGE.into(), images),
        Column::new(CURRENT_PRICE.into(), prices),
        Column::new(MARKET_CAP.into(), optional(|s| s.market_cap)),
        Column::new(TOTAL_VOLUME.into(), optional(|s| s.total_volume)),
        Column::new(HIGH_24H.into(), optional(|s| s.high_24h)),
        Column::new(LOW_24H.into(), optional(|s| s.low_24h)),
        Column::new(PRICE_CHANGE_PCT_24H.into(), optional(|s| s.price_change_pct_24h)),
        Column::new(CIRCULATING_SUPPLY.into(), optional(|s| s.circulating_supply)),
        Column::new(TOTAL_SUPPLY.into(), optional(|s| s.total_supply)),
        Column::new(LAST_UPDATED.into(), millis)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| StoreError::Parquet(format!("timestamp cast: {e}")))?,
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

/// Convert a validated DataFrame back to snapshots, keeping row order.
pub fn dataframe_to_snapshots(df: &DataFrame) -> Result<Vec<Snapshot>, StoreError> {
    SnapshotSchema::validate(df)?;
    let map_err = |e: PolarsError| StoreError::Schema(format!("column read: {e}"));

    let symbol = df.column(SYMBOL).map_err(map_err)?.str().map_err(map_err)?;
    let name = df.column(NAME).map_err(map_err)?.str().map_err(map_err)?;
    let image = df.column(IMAGE).map_err(map_err)?.str().map_err(map_err)?;

    let mut floats = Vec::with_capacity(FLOAT_COLUMNS.len());
    for c in FLOAT_COLUMNS {
        floats.push(df.column(c).map_err(map_err)?.f64().map_err(map_err)?);
    }
    let [price, cap, volume, high, low, change, circulating, supply] = floats.as_slice() else {
        return Err(StoreError::Schema("float column count".into()));
    };

    let millis_col = df
        .column(LAST_UPDATED)
        .map_err(map_err)?
        .cast(&DataType::Int64)
        .map_err(map_err)?;
    let millis = millis_col.i64().map_err(map_err)?;

    let null_at = |col: &str, i: usize| StoreError::Schema(format!("null '{col}' at row {i}"));

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let ms = millis.get(i).ok_or_else(|| null_at(LAST_UPDATED, i))?;
        let observed_at = DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| StoreError::Schema(format!("timestamp out of range at row {i}: {ms}")))?;

        rows.push(Snapshot {
            asset_id: symbol.get(i).ok_or_else(|| null_at(SYMBOL, i))?.to_string(),
            name: name.get(i).ok_or_else(|| null_at(NAME, i))?.to_string(),
            image_url: image.get(i).unwrap_or_default().to_string(),
            current_price: price.get(i).ok_or_else(|| null_at(CURRENT_PRICE, i))?,
            market_cap: cap.get(i),
            total_volume: volume.get(i),
            high_24h: high.get(i),
            low_24h: low.get(i),
            price_change_pct_24h: change.get(i),
            circulating_supply: circulating.get(i),
            total_supply: supply.get(i),
            observed_at,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> Vec<Snapshot> {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut btc = Snapshot::new("BTC", "Bitcoin", 64_000.0, t);
        btc.market_cap = Some(1.26e12);
        btc.total_supply = Some(21e6);
        let eth = Snapshot::new("ETH", "Ethereum", 3_100.0, t);
        vec![btc, eth]
    }

    #[test]
    fn schema_has_all_persisted_columns() {
        let schema = SnapshotSchema::schema();
        assert_eq!(schema.len(), 12);
        for col in [SYMBOL, NAME, IMAGE, CURRENT_PRICE, TOTAL_SUPPLY, LAST_UPDATED] {
            assert!(schema.contains(col), "missing {col}");
        }
    }

    #[test]
    fn dataframe_roundtrip_keeps_nulls_and_order() {
        let rows = sample();
        let df = snapshots_to_dataframe(&rows).unwrap();
        assert_eq!(df.height(), 2);

        let back = dataframe_to_snapshots(&df).unwrap();
        assert_eq!(back, rows);
        assert_eq!(back[1].market_cap, None);
    }

    #[test]
    fn empty_table_converts() {
        let df = snapshots_to_dataframe(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert!(dataframe_to_snapshots(&df).unwrap().is_empty());
    }

    #[test]
    fn validate_rejects_missing_column() {
        let df = snapshots_to_dataframe(&sample()).unwrap().drop(TOTAL_SUPPLY).unwrap();
        match SnapshotSchema::validate(&df) {
            Err(StoreError::Schema(msg)) => assert!(msg.contains(TOTAL_SUPPLY)),
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let mut df = snapshots_to_dataframe(&sample()).unwrap();
        df.with_column(Column::new(CURRENT_PRICE.into(), ["a", "b"]))
            .unwrap();
        assert!(matches!(
            SnapshotSchema::validate(&df),
            Err(StoreError::Schema(_))
        ));
    }
}
