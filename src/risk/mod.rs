//! Risk classification
//!
//! Implements:
//! - Severity classification against warning / crash thresholds
//! - Trailing-window trend of the risk score (change24h)

use crate::config::{DEFAULT_CRASH_THRESHOLD, DEFAULT_WARNING_THRESHOLD};
use crate::types::RiskStatus;

pub mod trend;
pub use trend::TrendTracker;

/// Risk score cutoffs. `crash` is always above `warning`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub warning: f64,
    pub crash: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            warning: DEFAULT_WARNING_THRESHOLD,
            crash: DEFAULT_CRASH_THRESHOLD,
        }
    }
}

impl RiskThresholds {
    pub fn new(warning: f64, crash: f64) -> Self {
        debug_assert!(crash > warning, "crash threshold must exceed warning");
        Self { warning, crash }
    }

    /// Strict comparisons: a score equal to a threshold stays in the lower band
    pub fn classify(&self, risk: f64) -> RiskStatus {
        if risk > self.crash {
            RiskStatus::Critical
        } else if risk > self.warning {
            RiskStatus::Warning
        } else {
            RiskStatus::Normal
        }
    }

    pub fn is_crash(&self, risk: f64) -> bool {
        risk > self.crash
    }
}
