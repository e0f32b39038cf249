//! Proof backends - external provers behind one exit-code/timeout contract

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::process::run_bounded;
use crate::config::{AppConfig, BackendKind};
use crate::error::ProofError;
use crate::ml_engine::ModelWeights;
use crate::persistence::write_json_atomic_timeout;
use crate::types::{CrashTrigger, NUM_FEATURES};

/// An external prover. `invoke` receives the persisted crash trigger and
/// returns the artifact path once the prover has exited 0 and left a
/// non-empty artifact behind.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProofBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn timeout(&self) -> Duration;

    async fn invoke(&self, input_path: &Path) -> Result<PathBuf, ProofError>;
}

/// Interpreter + prove script, e.g. `python3 prove_crash.py <trigger>`
#[derive(Debug, Clone)]
pub struct ScriptBackend {
    interpreter: String,
    script: PathBuf,
    args: Vec<String>,
    artifact: PathBuf,
    timeout: Duration,
}

impl ScriptBackend {
    pub fn new(
        interpreter: impl Into<String>,
        script: impl Into<PathBuf>,
        args: Vec<String>,
        artifact: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            script: script.into(),
            args,
            artifact: artifact.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProofBackend for ScriptBackend {
    fn name(&self) -> &'static str {
        "script"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn invoke(&self, input_path: &Path) -> Result<PathBuf, ProofError> {
        if !tokio::fs::try_exists(&self.script).await.unwrap_or(false) {
            return Err(ProofError::BackendMissing(self.script.clone()));
        }

        clear_artifact(&self.artifact).await?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&self.script).args(&self.args).arg(input_path);

        info!(script = %self.script.display(), input = %input_path.display(), "Triggering ZK proof generation");
        run_bounded(cmd, Path::new(&self.interpreter), self.timeout).await?;
        check_artifact(&self.artifact).await
    }
}

/// Sequence half of the zkVM input
#[derive(Debug, Serialize)]
struct MarketSequence {
    sequence: Vec<[f32; NUM_FEATURES]>,
}

/// Document read by the zkVM host: model weights plus the market sequence
#[derive(Debug, Serialize)]
struct ZkVmInput<'a> {
    weights: &'a ModelWeights,
    market_data: MarketSequence,
}

/// Native zkVM host binary. Before each run it exports the model weights and
/// the triggering sequence to `zk_input`, then runs `host_binary <zk_input>`.
/// The export is bounded by `io_timeout`, the run by `timeout`.
#[derive(Debug, Clone)]
pub struct ZkVmHostBackend {
    host_binary: PathBuf,
    zk_input: PathBuf,
    weights: Arc<ModelWeights>,
    artifact: PathBuf,
    timeout: Duration,
    io_timeout: Duration,
}

impl ZkVmHostBackend {
    pub fn new(
        host_binary: impl Into<PathBuf>,
        zk_input: impl Into<PathBuf>,
        weights: Arc<ModelWeights>,
        artifact: impl Into<PathBuf>,
        timeout: Duration,
        io_timeout: Duration,
    ) -> Self {
        Self {
            host_binary: host_binary.into(),
            zk_input: zk_input.into(),
            weights,
            artifact: artifact.into(),
            timeout,
            io_timeout,
        }
    }

    async fn prepare(&self, input_path: &Path) -> Result<(), ProofError> {
        let raw = match tokio::time::timeout(self.io_timeout, tokio::fs::read(input_path)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                return Err(ProofError::Prepare(format!("{}: {}", input_path.display(), e)))
            }
            Err(_) => {
                return Err(ProofError::Prepare(format!(
                    "reading {} timed out after {:?}",
                    input_path.display(),
                    self.io_timeout
                )))
            }
        };
        let trigger: CrashTrigger = serde_json::from_slice(&raw)
            .map_err(|e| ProofError::Prepare(format!("{}: {}", input_path.display(), e)))?;

        let input = ZkVmInput {
            weights: &self.weights,
            market_data: MarketSequence {
                sequence: trigger
                    .input_tensor
                    .iter()
                    .map(|row| row.map(|v| v as f32))
                    .collect(),
            },
        };

        write_json_atomic_timeout(&self.zk_input, &input, self.io_timeout)
            .await
            .map_err(|e| ProofError::Prepare(format!("{:#}", e)))
    }
}

#[async_trait]
impl ProofBackend for ZkVmHostBackend {
    fn name(&self) -> &'static str {
        "zkvm_host"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn invoke(&self, input_path: &Path) -> Result<PathBuf, ProofError> {
        if !tokio::fs::try_exists(&self.host_binary).await.unwrap_or(false) {
            return Err(ProofError::BackendMissing(self.host_binary.clone()));
        }

        self.prepare(input_path).await?;
        clear_artifact(&self.artifact).await?;

        let mut cmd = Command::new(&self.host_binary);
        cmd.arg(&self.zk_input);

        info!(host = %self.host_binary.display(), input = %self.zk_input.display(), "Starting zkVM prover");
        run_bounded(cmd, &self.host_binary, self.timeout).await?;
        check_artifact(&self.artifact).await
    }
}

/// Remove the previous run's artifact so only a fresh one counts as success
async fn clear_artifact(path: &Path) -> Result<(), ProofError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(artifact = %path.display(), "Removed previous proof artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProofError::Prepare(format!(
            "failed to remove stale artifact {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Artifact must exist and be non-empty
async fn check_artifact(path: &Path) -> Result<PathBuf, ProofError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(path.to_path_buf()),
        _ => Err(ProofError::MissingArtifact(path.to_path_buf())),
    }
}

/// Build the configured backend. The zkVM backend needs exportable weights;
/// without them it falls back to the script backend.
pub fn build_backend(config: &AppConfig, weights: Option<&ModelWeights>) -> Box<dyn ProofBackend> {
    let p = &config.proof;
    let timeout = config.proof_timeout();

    match (p.backend, weights) {
        (BackendKind::ZkvmHost, Some(w)) => Box::new(ZkVmHostBackend::new(
            &p.host_binary,
            &p.zk_input,
            Arc::new(w.clone()),
            &p.artifact,
            timeout,
            config.io_timeout(),
        )),
        (BackendKind::ZkvmHost, None) => {
            tracing::warn!("zkVM backend selected but model weights are not exportable, using script backend");
            Box::new(ScriptBackend::new(
                &p.interpreter,
                &p.script,
                p.script_args.clone(),
                &p.artifact,
                timeout,
            ))
        }
        (BackendKind::Script, _) => Box::new(ScriptBackend::new(
            &p.interpreter,
            &p.script,
            p.script_args.clone(),
            &p.artifact,
            timeout,
        )),
    }
}
