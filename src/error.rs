//! Error types for Sentinel

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The trained model could not be loaded. Fatal at startup.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Model feature order {found:?} does not match required order {expected:?}")]
    FeatureOrder {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Model was trained on sequences of {model} steps but engine is configured for {configured}")]
    SequenceLength { model: usize, configured: usize },

    #[error("Layer {layer}: {reason}")]
    Shape { layer: usize, reason: String },

    #[error("Model has no layers")]
    Empty,
}

/// A single prediction failed. Recoverable, the cycle is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Expected a sequence of {expected} steps, got {actual}")]
    SequenceLength { expected: usize, actual: usize },

    #[error("Expected {expected} features per step, got {actual}")]
    FeatureCount { expected: usize, actual: usize },

    #[error("Model produced a non-finite output: {0}")]
    NonFinite(f64),

    #[error("Model produced {0} outputs, expected exactly one")]
    OutputShape(usize),
}

/// Reading the market-data file failed
#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Market data file not found: {0}")]
    NotFound(PathBuf),

    #[error("Market data file {path} is not valid JSON: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read market data file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Market data read timed out after {0:?}")]
    Timeout(Duration),
}

impl MarketDataError {
    /// Absent or unparseable feeds degrade to the safe default record;
    /// anything else skips the cycle.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            MarketDataError::NotFound(_) | MarketDataError::Malformed { .. }
        )
    }
}

/// Proof generation failed. Reported, never retried within a cycle.
#[derive(Error, Debug)]
pub enum ProofError {
    #[error("Proof backend executable not found: {0}")]
    BackendMissing(PathBuf),

    #[error("Failed to spawn proof backend: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Proof backend exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Proof backend timed out after {0:?}")]
    Timeout(Duration),

    #[error("Proof backend succeeded but artifact {0} is missing or empty")]
    MissingArtifact(PathBuf),

    #[error("Failed to prepare proof input: {0}")]
    Prepare(String),

    #[error("Failed to persist crash trigger to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },
}

/// Unrecoverable loop failure
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),

    #[error("Risk estimator unusable after {0} consecutive prediction failures")]
    EstimatorUnusable(u32),
}
