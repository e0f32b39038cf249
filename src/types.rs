//! Core types used throughout Sentinel
//!
//! Defines feature records, risk estimates, the published decision and the
//! crash trigger handed to the proof backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of features per timestep
pub const NUM_FEATURES: usize = 4;

/// Model input order. The network was trained on exactly this column order;
/// any other order silently produces garbage.
pub const FEATURE_ORDER: [&str; NUM_FEATURES] = ["blr", "buy_volume", "sell_volume", "mid_price"];

/// One raw market observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Buy-side liquidity ratio
    pub blr: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub mid_price: f64,
}

impl FeatureRecord {
    pub const DEFAULT_BLR: f64 = 1.0;
    pub const DEFAULT_BUY_VOLUME: f64 = 5000.0;
    pub const DEFAULT_SELL_VOLUME: f64 = 5000.0;
    pub const DEFAULT_MID_PRICE: f64 = 3000.0;

    pub fn new(blr: f64, buy_volume: f64, sell_volume: f64, mid_price: f64) -> Self {
        Self {
            blr,
            buy_volume,
            sell_volume,
            mid_price,
        }
    }

    /// Record substituted when the market-data feed is absent or unreadable
    /// as a whole. Slightly buy-heavy so a dead feed never looks like a crash.
    pub fn safe_default() -> Self {
        Self::new(1.2, 5000.0, 4000.0, 3000.0)
    }
}

impl Default for FeatureRecord {
    /// Per-field defaults used when individual fields are missing
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_BLR,
            Self::DEFAULT_BUY_VOLUME,
            Self::DEFAULT_SELL_VOLUME,
            Self::DEFAULT_MID_PRICE,
        )
    }
}

/// Feature record scaled into [0, 1] per field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFeatureRecord {
    pub blr: f64,
    pub buy_volume: f64,
    pub sell_volume: f64,
    pub mid_price: f64,
}

impl NormalizedFeatureRecord {
    /// Values in [`FEATURE_ORDER`]
    pub fn to_array(&self) -> [f64; NUM_FEATURES] {
        [self.blr, self.buy_volume, self.sell_volume, self.mid_price]
    }

    pub fn to_f32_array(&self) -> [f32; NUM_FEATURES] {
        let v = self.to_array();
        [v[0] as f32, v[1] as f32, v[2] as f32, v[3] as f32]
    }
}

/// Model output for one full buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskEstimate {
    pub value: f64,
    pub produced_at: DateTime<Utc>,
}

/// Severity published to the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskStatus {
    Normal,
    Warning,
    Critical,
}

impl RiskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskStatus::Normal => "normal",
            RiskStatus::Warning => "warning",
            RiskStatus::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Round half away from zero to `dp` decimal places
pub fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

/// The live feed document consumed by the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Model output, 4 decimals
    pub risk_score: f64,
    /// Signed percentage, 2 decimals
    #[serde(rename = "change24h")]
    pub change_24h: f64,
    /// Raw BLR, 4 decimals
    pub liquidity_health: f64,
    pub timestamp: DateTime<Utc>,
    pub status: RiskStatus,
}

impl Decision {
    /// Build a decision, applying the published rounding
    pub fn new(
        risk_score: f64,
        change_24h: f64,
        liquidity_health: f64,
        status: RiskStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            risk_score: round_dp(risk_score, 4),
            change_24h: round_dp(change_24h, 2),
            liquidity_health: round_dp(liquidity_health, 4),
            timestamp,
            status,
        }
    }
}

/// Inputs captured at the moment risk crossed the crash threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrashTrigger {
    pub trigger_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub risk_score: f64,
    /// Raw record read on the triggering cycle
    pub features: FeatureRecord,
    /// Buffer snapshot, oldest first, one row per timestep in [`FEATURE_ORDER`]
    pub input_tensor: Vec<[f64; NUM_FEATURES]>,
    /// Same tensor flattened into the single-batch layout EZKL reads
    pub input_data: Vec<Vec<f64>>,
    /// sha256 over the little-endian f64 bytes of `input_tensor`
    pub input_digest: String,
}

impl CrashTrigger {
    pub fn new(
        timestamp: DateTime<Utc>,
        risk_score: f64,
        features: FeatureRecord,
        snapshot: &[NormalizedFeatureRecord],
    ) -> Self {
        let input_tensor: Vec<[f64; NUM_FEATURES]> =
            snapshot.iter().map(|r| r.to_array()).collect();
        let flat: Vec<f64> = input_tensor.iter().flatten().copied().collect();
        let input_digest = tensor_digest(&input_tensor);

        Self {
            trigger_id: Uuid::new_v4(),
            timestamp,
            risk_score,
            features,
            input_tensor,
            input_data: vec![flat],
            input_digest,
        }
    }

    pub fn sequence_len(&self) -> usize {
        self.input_tensor.len()
    }

    /// True when `input_digest` still matches `input_tensor`
    pub fn verify_digest(&self) -> bool {
        tensor_digest(&self.input_tensor) == self.input_digest
    }
}

/// Hex sha256 over the little-endian f64 bytes of `tensor`, row-major
pub fn tensor_digest(tensor: &[[f64; NUM_FEATURES]]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    for v in tensor.iter().flatten() {
        hasher.update(v.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}
