//! Feature Engine - market-liquidity features for the risk model
//!
//! - Raw record parsing with field aliases and per-field defaults
//! - Fixed-range normalization into [0, 1]
//! - Rolling temporal buffer feeding the model
//! - Market-data file source

use serde_json::Value;

use crate::types::{FeatureRecord, NormalizedFeatureRecord};

pub mod buffer;
pub use buffer::TemporalBuffer;

pub mod source;
pub use source::MarketDataSource;

/// Calibration range for one feature, taken from training
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `clip((x - min) / (max - min), 0, 1)`. NaN maps to 0.
    pub fn scale(&self, x: f64) -> f64 {
        let scaled = (x - self.min) / (self.max - self.min);
        if scaled.is_nan() {
            0.0
        } else {
            scaled.clamp(0.0, 1.0)
        }
    }
}

/// Per-feature calibration. Both volumes share one range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub blr: FeatureRange,
    pub volume: FeatureRange,
    pub price: FeatureRange,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            blr: FeatureRange::new(0.3, 1.5),
            volume: FeatureRange::new(0.0, 10_000.0),
            price: FeatureRange::new(2500.0, 3500.0),
        }
    }
}

/// Maps raw records into the model's input space
#[derive(Debug, Clone, Default)]
pub struct FeatureNormalizer {
    calibration: Calibration,
}

impl FeatureNormalizer {
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Total: out-of-range input is clamped, never rejected
    pub fn normalize(&self, record: &FeatureRecord) -> NormalizedFeatureRecord {
        let c = &self.calibration;
        NormalizedFeatureRecord {
            blr: c.blr.scale(record.blr),
            buy_volume: c.volume.scale(record.buy_volume),
            sell_volume: c.volume.scale(record.sell_volume),
            mid_price: c.price.scale(record.mid_price),
        }
    }
}

const BLR_KEYS: &[&str] = &["blr", "buyLiquidityRatio", "buy_liquidity_ratio"];
const BUY_VOLUME_KEYS: &[&str] = &["buyVolume", "buy_volume"];
const SELL_VOLUME_KEYS: &[&str] = &["sellVolume", "sell_volume"];
const MID_PRICE_KEYS: &[&str] = &["midPrice", "mid_price"];

/// Parse a crawler document into a [`FeatureRecord`].
///
/// Arrays contribute their last element (an empty array yields defaults).
/// Any field that is absent or not numeric falls back to its default; a
/// non-object document yields an all-default record.
pub fn parse_raw_record(value: &Value) -> FeatureRecord {
    let latest = match value {
        Value::Array(items) => items.last(),
        other => Some(other),
    };

    let Some(Value::Object(obj)) = latest else {
        return FeatureRecord::default();
    };

    let field = |keys: &[&str], default: f64| -> f64 {
        keys.iter()
            .find_map(|k| obj.get(*k).and_then(numeric))
            .unwrap_or(default)
    };

    FeatureRecord {
        blr: field(BLR_KEYS, FeatureRecord::DEFAULT_BLR),
        buy_volume: field(BUY_VOLUME_KEYS, FeatureRecord::DEFAULT_BUY_VOLUME),
        sell_volume: field(SELL_VOLUME_KEYS, FeatureRecord::DEFAULT_SELL_VOLUME),
        mid_price: field(MID_PRICE_KEYS, FeatureRecord::DEFAULT_MID_PRICE),
    }
}

// Crawler occasionally emits numbers as strings
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn in_unit(v: f64) -> bool {
        (0.0..=1.0).contains(&v)
    }

    #[test]
    fn test_normalize_within_range() {
        let n = FeatureNormalizer::default();
        let out = n.normalize(&FeatureRecord::new(0.9, 5000.0, 2500.0, 3000.0));

        assert!((out.blr - 0.5).abs() < 1e-12);
        assert!((out.buy_volume - 0.5).abs() < 1e-12);
        assert!((out.sell_volume - 0.25).abs() < 1e-12);
        assert!((out.mid_price - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_clamps_far_out_of_range() {
        let n = FeatureNormalizer::default();

        let low = n.normalize(&FeatureRecord::new(-5.0, -1e9, -3.0, 0.0));
        assert_eq!(low.blr, 0.0);
        assert_eq!(low.buy_volume, 0.0);
        assert_eq!(low.sell_volume, 0.0);
        assert_eq!(low.mid_price, 0.0);

        let high = n.normalize(&FeatureRecord::new(100.0, 1e12, 20_000.0, 1e6));
        assert_eq!(high.blr, 1.0);
        assert_eq!(high.buy_volume, 1.0);
        assert_eq!(high.sell_volume, 1.0);
        assert_eq!(high.mid_price, 1.0);
    }

    #[test]
    fn test_normalize_non_finite_stays_bounded() {
        let n = FeatureNormalizer::default();
        let out = n.normalize(&FeatureRecord::new(
            f64::NAN,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NAN,
        ));
        for v in out.to_array() {
            assert!(in_unit(v), "{} escaped [0, 1]", v);
        }
        assert_eq!(out.buy_volume, 1.0);
        assert_eq!(out.sell_volume, 0.0);
    }

    #[test]
    fn test_normalize_sweep_always_bounded() {
        let n = FeatureNormalizer::default();
        let mut x = -1e6;
        while x < 1e6 {
            let out = n.normalize(&FeatureRecord::new(x, x, x, x));
            assert!(out.to_array().iter().all(|v| in_unit(*v)));
            x += 7919.3;
        }
    }

    #[test]
    fn test_parse_camel_case_object() {
        let rec = parse_raw_record(&json!({
            "buyLiquidityRatio": 0.7,
            "buyVolume": 1200.0,
            "sellVolume": 8000,
            "midPrice": 2950.5
        }));
        assert_eq!(rec, FeatureRecord::new(0.7, 1200.0, 8000.0, 2950.5));
    }

    #[test]
    fn test_parse_snake_case_and_blr_alias() {
        let rec = parse_raw_record(&json!({
            "blr": 0.45,
            "buy_volume": 10,
            "sell_volume": 20,
            "mid_price": 2600
        }));
        assert_eq!(rec, FeatureRecord::new(0.45, 10.0, 20.0, 2600.0));
    }

    #[test]
    fn test_parse_blr_takes_precedence_over_long_name() {
        let rec = parse_raw_record(&json!({ "blr": 0.5, "buyLiquidityRatio": 0.9 }));
        assert_eq!(rec.blr, 0.5);
    }

    #[test]
    fn test_parse_array_uses_last_element() {
        let rec = parse_raw_record(&json!([
            { "blr": 0.4 },
            { "blr": 1.4, "midPrice": 3100 }
        ]));
        assert_eq!(rec.blr, 1.4);
        assert_eq!(rec.mid_price, 3100.0);
        assert_eq!(rec.buy_volume, FeatureRecord::DEFAULT_BUY_VOLUME);
    }

    #[test]
    fn test_parse_empty_array_and_scalars_default() {
        assert_eq!(parse_raw_record(&json!([])), FeatureRecord::default());
        assert_eq!(parse_raw_record(&json!(42)), FeatureRecord::default());
        assert_eq!(parse_raw_record(&json!(null)), FeatureRecord::default());
    }

    #[test]
    fn test_parse_malformed_fields_default_per_field() {
        let rec = parse_raw_record(&json!({
            "blr": "not-a-number",
            "buyVolume": "1500.5",
            "sellVolume": null,
            "midPrice": { "nested": true }
        }));
        assert_eq!(rec.blr, FeatureRecord::DEFAULT_BLR);
        assert_eq!(rec.buy_volume, 1500.5);
        assert_eq!(rec.sell_volume, FeatureRecord::DEFAULT_SELL_VOLUME);
        assert_eq!(rec.mid_price, FeatureRecord::DEFAULT_MID_PRICE);
    }

    #[test]
    fn test_parse_falls_through_malformed_alias() {
        let rec = parse_raw_record(&json!({ "buyVolume": "junk", "buy_volume": 700 }));
        assert_eq!(rec.buy_volume, 700.0);
    }
}
