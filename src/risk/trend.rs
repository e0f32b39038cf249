//! Trend tracker - percentage change of the risk score over a trailing window

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::types::round_dp;

/// Time-stamped risk history, pruned to a trailing window.
///
/// The comparison point is the oldest entry still inside the window, not an
/// exact value from `window` ago. With a fresh process or a sparse cadence it
/// may be much younger than the window.
#[derive(Debug, Clone)]
pub struct TrendTracker {
    history: VecDeque<(DateTime<Utc>, f64)>,
    window: Duration,
}

impl Default for TrendTracker {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl TrendTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            history: VecDeque::new(),
            window,
        }
    }

    /// Record a score and return the change versus the oldest in-window entry,
    /// in percent, rounded to 2 decimals.
    pub fn record(&mut self, timestamp: DateTime<Utc>, risk: f64) -> f64 {
        // Keep the history non-decreasing if the clock steps back
        let timestamp = match self.history.back() {
            Some((last, _)) if timestamp < *last => {
                debug!(%timestamp, last = %last, "Risk timestamp went backwards, clamping");
                *last
            }
            _ => timestamp,
        };

        self.history.push_back((timestamp, risk));

        let cutoff = timestamp - self.window;
        while let Some((t, _)) = self.history.front() {
            if *t > cutoff {
                break;
            }
            self.history.pop_front();
        }

        if self.history.len() < 2 {
            return 0.0;
        }

        let oldest = self.history.front().map(|(_, v)| *v).unwrap_or(risk);
        if oldest == 0.0 {
            return 0.0;
        }

        round_dp((risk - oldest) / oldest * 100.0, 2)
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Oldest entry still inside the window
    pub fn oldest(&self) -> Option<(DateTime<Utc>, f64)> {
        self.history.front().copied()
    }
}
