//! JSON Persistence Module
//!
//! Writes the dashboard live feed and crash triggers. Every write goes to a
//! sibling temp file that is renamed over the target, so readers only ever
//! see a complete document.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error};

use crate::types::Decision;

/// Pretty-print `value` to `path`, replacing any previous content atomically.
/// Missing parent directories are created.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).context("Failed to serialize document")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, &json)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("Failed to move {} into place", path.display()));
    }

    Ok(())
}

/// Same as [`write_json_atomic`], bounded by `timeout`
pub async fn write_json_atomic_timeout<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    timeout: Duration,
) -> Result<()> {
    tokio::time::timeout(timeout, write_json_atomic(path, value))
        .await
        .with_context(|| format!("Write to {} timed out after {:?}", path.display(), timeout))?
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Publishes the latest [`Decision`] to the dashboard feed
#[derive(Debug, Clone)]
pub struct DecisionPublisher {
    path: PathBuf,
    io_timeout: Duration,
}

impl DecisionPublisher {
    pub fn new(path: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            io_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the feed. On failure the previous document stays on disk and
    /// `false` is returned.
    pub async fn publish(&self, decision: &Decision) -> bool {
        match write_json_atomic_timeout(&self.path, decision, self.io_timeout).await {
            Ok(()) => {
                debug!(path = %self.path.display(), status = %decision.status, "Decision published");
                true
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %format!("{:#}", e), "Failed to write output");
                false
            }
        }
    }
}

/// Read a published decision back
pub fn read_decision(path: &Path) -> Result<Decision> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}
