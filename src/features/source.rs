//! Market-data file written by the crawler

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::parse_raw_record;
use crate::error::MarketDataError;
use crate::types::FeatureRecord;

/// Reads the latest observation from the crawler's JSON output
#[derive(Debug, Clone)]
pub struct MarketDataSource {
    path: PathBuf,
    io_timeout: Duration,
}

impl MarketDataSource {
    pub fn new(path: impl Into<PathBuf>, io_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            io_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file.
    ///
    /// Missing fields are defaulted by [`parse_raw_record`]; only whole-file
    /// failures surface as errors.
    pub async fn read(&self) -> Result<FeatureRecord, MarketDataError> {
        let bytes = match tokio::time::timeout(self.io_timeout, tokio::fs::read(&self.path)).await
        {
            Err(_) => return Err(MarketDataError::Timeout(self.io_timeout)),
            Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(MarketDataError::NotFound(self.path.clone()))
            }
            Ok(Err(e)) => {
                return Err(MarketDataError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
            Ok(Ok(bytes)) => bytes,
        };

        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| MarketDataError::Malformed {
                path: self.path.clone(),
                source: e,
            })?;

        if value.as_array().map_or(false, |a| a.is_empty()) {
            debug!(path = %self.path.display(), "Market data is an empty list");
        }

        Ok(parse_raw_record(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(path: PathBuf) -> MarketDataSource {
        MarketDataSource::new(path, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_missing_file_is_degradable() {
        let dir = tempfile::tempdir().unwrap();
        let err = source(dir.path().join("absent.json")).read().await.unwrap_err();
        assert!(matches!(err, MarketDataError::NotFound(_)));
        assert!(err.is_degradable());
    }

    #[tokio::test]
    async fn test_invalid_json_is_degradable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = source(path).read().await.unwrap_err();
        assert!(matches!(err, MarketDataError::Malformed { .. }));
        assert!(err.is_degradable());
    }

    #[tokio::test]
    async fn test_directory_is_not_degradable() {
        let dir = tempfile::tempdir().unwrap();
        let err = source(dir.path().to_path_buf()).read().await.unwrap_err();
        assert!(matches!(err, MarketDataError::Io { .. }));
        assert!(!err.is_degradable());
    }

    #[tokio::test]
    async fn test_reads_latest_array_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.json");
        std::fs::write(
            &path,
            r#"[{"blr": 1.0}, {"blr": 0.35, "buyVolume": 100, "sellVolume": 9000, "midPrice": 2700}]"#,
        )
        .unwrap();

        let rec = source(path).read().await.unwrap();
        assert_eq!(rec, FeatureRecord::new(0.35, 100.0, 9000.0, 2700.0));
    }
}
