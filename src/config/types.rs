//! Configuration sections
//!
//! One struct per top-level table of the config file / `SENTINEL__<SECTION>__*`
//! environment namespace.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Timesteps per model input, must match training
    pub sequence_length: usize,
    /// Delay between the end of one cycle and the start of the next
    pub interval_ms: u64,
    /// Upper bound on a single local file read or write
    pub io_timeout_ms: u64,
    /// Consecutive prediction failures before the loop gives up (0 = never)
    pub max_consecutive_prediction_failures: u32,
    /// Trailing window for the change24h metric
    pub trend_window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Serialized LSTM weights
    pub model: PathBuf,
    /// Crawler output (single object or array of objects)
    pub market_data: PathBuf,
    /// Dashboard live feed
    pub output: PathBuf,
    /// Crash trigger handed to the proof backend
    pub crash_input: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThresholdConfig {
    pub warning: f64,
    pub crash: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalibrationConfig {
    pub blr_min: f64,
    pub blr_max: f64,
    pub volume_min: f64,
    pub volume_max: f64,
    pub price_min: f64,
    pub price_max: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Interpreter + prove script (EZKL pipeline)
    Script,
    /// Native zkVM host binary
    ZkvmHost,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProofConfig {
    pub backend: BackendKind,
    /// Script backend: interpreter, e.g. python3
    pub interpreter: String,
    /// Script backend: prove script path
    pub script: PathBuf,
    /// Script backend: args placed between the script and the trigger path
    pub script_args: Vec<String>,
    /// zkVM backend: host binary
    pub host_binary: PathBuf,
    /// zkVM backend: weights + sequence export written before each run
    pub zk_input: PathBuf,
    /// Artifact the backend writes on success
    pub artifact: PathBuf,
    /// Hard wall-clock limit; 0 picks the backend default
    pub timeout_ms: u64,
    /// Suppress repeat proofs until risk falls back to the crash threshold
    pub rearm_below_threshold: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines on stdout
    pub json: bool,
    /// Plain-text log file; empty disables it
    pub file: String,
}
