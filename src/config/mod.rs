//! Configuration management for Sentinel
//!
//! Loads from optional config files + environment variables via .env

mod types;

pub use types::*;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::features::{Calibration, FeatureRange};
use crate::risk::RiskThresholds;

pub const DEFAULT_SEQUENCE_LENGTH: usize = 60;
pub const DEFAULT_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_IO_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TREND_WINDOW_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_CRASH_THRESHOLD: f64 = 0.8;
pub const DEFAULT_WARNING_THRESHOLD: f64 = 0.6;
pub const DEFAULT_SCRIPT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_ZKVM_TIMEOUT_MS: u64 = 120_000;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub paths: PathsConfig,
    pub thresholds: ThresholdConfig,
    pub calibration: CalibrationConfig,
    pub proof: ProofConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();
        Self::load_from(&["config/default", "config/local"], true)
    }

    /// Load from the compiled-in defaults plus the given optional files.
    /// Environment variables (SENTINEL__SECTION__KEY) are applied last when
    /// `with_env` is set.
    pub fn load_from(files: &[&str], with_env: bool) -> Result<Self> {
        let mut builder = Config::builder()
            // Engine defaults
            .set_default("engine.sequence_length", DEFAULT_SEQUENCE_LENGTH as u64)?
            .set_default("engine.interval_ms", DEFAULT_INTERVAL_MS)?
            .set_default("engine.io_timeout_ms", DEFAULT_IO_TIMEOUT_MS)?
            .set_default("engine.max_consecutive_prediction_failures", 0u64)?
            .set_default("engine.trend_window_secs", DEFAULT_TREND_WINDOW_SECS)?
            // Path defaults (relative to the ml-sentinel root)
            .set_default("paths.model", "model/trained/aegis_lstm_weights.json")?
            .set_default("paths.market_data", "data-pipeline/data/market_depth.json")?
            .set_default("paths.output", "../frontend-cockpit/public/live_feed.json")?
            .set_default("paths.crash_input", "zk-circuit/crash_input.json")?
            // Threshold defaults
            .set_default("thresholds.warning", DEFAULT_WARNING_THRESHOLD)?
            .set_default("thresholds.crash", DEFAULT_CRASH_THRESHOLD)?
            // Calibration defaults (from training)
            .set_default("calibration.blr_min", 0.3)?
            .set_default("calibration.blr_max", 1.5)?
            .set_default("calibration.volume_min", 0.0)?
            .set_default("calibration.volume_max", 10_000.0)?
            .set_default("calibration.price_min", 2500.0)?
            .set_default("calibration.price_max", 3500.0)?
            // Proof defaults
            .set_default("proof.backend", "script")?
            .set_default("proof.interpreter", "python3")?
            .set_default("proof.script", "zk-circuit/prove_crash.py")?
            .set_default("proof.script_args", Vec::<String>::new())?
            .set_default(
                "proof.host_binary",
                "zk-circuit/risc0-verifier/target/release/host",
            )?
            .set_default("proof.zk_input", "zk-circuit/zk_input.json")?
            .set_default("proof.artifact", "../blockchain-evm/proofs/crash_proof.json")?
            .set_default("proof.timeout_ms", 0u64)?
            .set_default("proof.rearm_below_threshold", false)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .set_default("logging.file", "logs/sentinel.log")?;

        for file in files {
            builder = builder.add_source(File::with_name(file).required(false));
        }

        if with_env {
            // Override with environment variables (SENTINEL__*)
            builder = builder.add_source(
                Environment::with_prefix("SENTINEL")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("proof.script_args")
                    .try_parsing(true),
            );
        }

        let config = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, v) in [("warning", t.warning), ("crash", t.crash)] {
            if !(0.0..=1.0).contains(&v) {
                bail!("thresholds.{} must be within [0, 1], got {}", name, v);
            }
        }
        if t.crash <= t.warning {
            bail!(
                "thresholds.crash ({}) must be greater than thresholds.warning ({})",
                t.crash,
                t.warning
            );
        }

        if self.engine.sequence_length == 0 {
            bail!("engine.sequence_length must be positive");
        }
        if self.engine.interval_ms == 0 {
            bail!("engine.interval_ms must be positive");
        }
        if self.engine.io_timeout_ms == 0 {
            bail!("engine.io_timeout_ms must be positive");
        }
        if self.engine.trend_window_secs == 0 {
            bail!("engine.trend_window_secs must be positive");
        }

        let c = &self.calibration;
        for (name, min, max) in [
            ("blr", c.blr_min, c.blr_max),
            ("volume", c.volume_min, c.volume_max),
            ("price", c.price_min, c.price_max),
        ] {
            if !(min.is_finite() && max.is_finite()) || max <= min {
                bail!(
                    "calibration.{name}_max ({max}) must be greater than calibration.{name}_min ({min})"
                );
            }
        }

        Ok(())
    }

    pub fn calibration(&self) -> Calibration {
        let c = &self.calibration;
        Calibration {
            blr: FeatureRange::new(c.blr_min, c.blr_max),
            volume: FeatureRange::new(c.volume_min, c.volume_max),
            price: FeatureRange::new(c.price_min, c.price_max),
        }
    }

    pub fn thresholds(&self) -> RiskThresholds {
        RiskThresholds::new(self.thresholds.warning, self.thresholds.crash)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.engine.interval_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.io_timeout_ms)
    }

    /// Proof timeout, falling back to the selected backend's default
    pub fn proof_timeout(&self) -> Duration {
        match (self.proof.timeout_ms, self.proof.backend) {
            (0, BackendKind::Script) => Duration::from_millis(DEFAULT_SCRIPT_TIMEOUT_MS),
            (0, BackendKind::ZkvmHost) => Duration::from_millis(DEFAULT_ZKVM_TIMEOUT_MS),
            (ms, _) => Duration::from_millis(ms),
        }
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "seq_len={} interval_ms={} warning={:.2} crash={:.2} backend={:?} proof_timeout={:?} model={} input={} output={}",
            self.engine.sequence_length,
            self.engine.interval_ms,
            self.thresholds.warning,
            self.thresholds.crash,
            self.proof.backend,
            self.proof_timeout(),
            self.paths.model.display(),
            self.paths.market_data.display(),
            self.paths.output.display(),
        )
    }
}

impl Default for AppConfig {
    /// Same values as the compiled-in defaults of [`AppConfig::load`]
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                sequence_length: DEFAULT_SEQUENCE_LENGTH,
                interval_ms: DEFAULT_INTERVAL_MS,
                io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
                max_consecutive_prediction_failures: 0,
                trend_window_secs: DEFAULT_TREND_WINDOW_SECS,
            },
            paths: PathsConfig {
                model: PathBuf::from("model/trained/aegis_lstm_weights.json"),
                market_data: PathBuf::from("data-pipeline/data/market_depth.json"),
                output: PathBuf::from("../frontend-cockpit/public/live_feed.json"),
                crash_input: PathBuf::from("zk-circuit/crash_input.json"),
            },
            thresholds: ThresholdConfig {
                warning: DEFAULT_WARNING_THRESHOLD,
                crash: DEFAULT_CRASH_THRESHOLD,
            },
            calibration: CalibrationConfig {
                blr_min: 0.3,
                blr_max: 1.5,
                volume_min: 0.0,
                volume_max: 10_000.0,
                price_min: 2500.0,
                price_max: 3500.0,
            },
            proof: ProofConfig {
                backend: BackendKind::Script,
                interpreter: "python3".to_string(),
                script: PathBuf::from("zk-circuit/prove_crash.py"),
                script_args: Vec::new(),
                host_binary: PathBuf::from("zk-circuit/risc0-verifier/target/release/host"),
                zk_input: PathBuf::from("zk-circuit/zk_input.json"),
                artifact: PathBuf::from("../blockchain-evm/proofs/crash_proof.json"),
                timeout_ms: 0,
                rearm_below_threshold: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
                file: "logs/sentinel.log".to_string(),
            },
        }
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
