//! Inference loop driver
//!
//! One task, one cycle at a time:
//! acquire → normalize → buffer → estimate → trend → publish → crash response,
//! then a fixed delay before the next cycle. Every step is isolated: a failed
//! read, prediction or write skips the rest of the cycle, never the loop.

use chrono::Utc;
use std::fmt;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::AppConfig;
use crate::error::{EngineError, PredictionError};
use crate::features::{FeatureNormalizer, MarketDataSource, TemporalBuffer};
use crate::ml_engine::RiskEstimator;
use crate::persistence::DecisionPublisher;
use crate::proof::{build_backend, CrashEvaluation, CrashResponse, CrashResponseCoordinator, ProofBackend};
use crate::risk::{RiskThresholds, TrendTracker};
use crate::types::{Decision, FeatureRecord, RiskEstimate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initializing,
    Running,
    Stopped,
}

/// How this cycle's market record was obtained
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    /// Parsed from the market-data file
    Live,
    /// File absent or unparseable, safe-default record used
    Fallback(String),
    /// Unexpected read failure, cycle skipped
    Skipped(String),
}

/// Everything one cycle did
#[derive(Debug)]
pub struct CycleReport {
    pub iteration: u64,
    pub acquisition: Acquisition,
    pub record: Option<FeatureRecord>,
    /// Buffer fill after this cycle
    pub buffered: usize,
    pub estimate: Option<RiskEstimate>,
    pub prediction_error: Option<PredictionError>,
    pub decision: Option<Decision>,
    pub published: bool,
    pub crash: Option<CrashResponse>,
}

impl CycleReport {
    fn new(iteration: u64) -> Self {
        Self {
            iteration,
            acquisition: Acquisition::Live,
            record: None,
            buffered: 0,
            estimate: None,
            prediction_error: None,
            decision: None,
            published: false,
            crash: None,
        }
    }
}

pub struct InferenceEngine {
    config: AppConfig,
    state: EngineState,
    source: MarketDataSource,
    normalizer: FeatureNormalizer,
    buffer: TemporalBuffer,
    estimator: RiskEstimator,
    thresholds: RiskThresholds,
    trend: TrendTracker,
    publisher: DecisionPublisher,
    coordinator: CrashResponseCoordinator,
    iteration: u64,
    consecutive_failures: u32,
}

impl InferenceEngine {
    /// Load the model from `paths.model` and build the configured proof
    /// backend. A model that cannot be loaded is fatal.
    pub fn initialize(config: AppConfig) -> Result<Self, EngineError> {
        info!("Initializing Sentinel inference engine...");
        let estimator = RiskEstimator::load(&config.paths.model, config.engine.sequence_length)?;
        let backend = build_backend(&config, estimator.weights());
        Ok(Self::with_estimator(config, estimator, backend))
    }

    /// Build around an already-loaded estimator and backend
    pub fn with_estimator(
        config: AppConfig,
        estimator: RiskEstimator,
        backend: Box<dyn ProofBackend>,
    ) -> Self {
        let io_timeout = config.io_timeout();
        let thresholds = config.thresholds();
        let window = chrono::Duration::seconds(config.engine.trend_window_secs as i64);

        let coordinator = CrashResponseCoordinator::new(
            thresholds,
            config.paths.crash_input.clone(),
            backend,
            io_timeout,
        )
        .with_rearm_below_threshold(config.proof.rearm_below_threshold);

        info!(
            sequence_length = estimator.sequence_length(),
            backend = coordinator.backend_name(),
            warning = thresholds.warning,
            crash = thresholds.crash,
            "Engine ready"
        );

        Self {
            source: MarketDataSource::new(config.paths.market_data.clone(), io_timeout),
            normalizer: FeatureNormalizer::new(config.calibration()),
            buffer: TemporalBuffer::new(estimator.sequence_length()),
            publisher: DecisionPublisher::new(config.paths.output.clone(), io_timeout),
            trend: TrendTracker::new(window),
            thresholds,
            estimator,
            coordinator,
            config,
            state: EngineState::Initializing,
            iteration: 0,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn buffer(&self) -> &TemporalBuffer {
        &self.buffer
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run one full cycle.
    ///
    /// Recoverable failures are logged and recorded in the report. Only the
    /// consecutive prediction-failure limit returns an error.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, EngineError> {
        self.iteration += 1;
        let span = info_span!("cycle", iteration = self.iteration);
        self.cycle().instrument(span).await
    }

    async fn cycle(&mut self) -> Result<CycleReport, EngineError> {
        let now = Utc::now();
        let mut report = CycleReport::new(self.iteration);
        info!("--- Iteration {} ---", self.iteration);

        // 1. Acquire
        let record = match self.source.read().await {
            Ok(record) => record,
            Err(e) if e.is_degradable() => {
                warn!(error = %e, "Market data unavailable, using safe defaults");
                report.acquisition = Acquisition::Fallback(e.to_string());
                FeatureRecord::safe_default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to read market data, skipping cycle");
                report.acquisition = Acquisition::Skipped(e.to_string());
                report.buffered = self.buffer.len();
                return Ok(report);
            }
        };
        info!(
            blr = record.blr,
            buy_volume = record.buy_volume,
            sell_volume = record.sell_volume,
            mid_price = record.mid_price,
            "📊 Market data"
        );
        report.record = Some(record);

        // 2. Normalize + buffer
        self.buffer.append(self.normalizer.normalize(&record));
        report.buffered = self.buffer.len();

        if !self.buffer.is_full() {
            info!(
                "⏳ Buffering data... {}/{}",
                self.buffer.len(),
                self.buffer.capacity()
            );
            return Ok(report);
        }

        // 3. Estimate
        let snapshot = self.buffer.snapshot();
        let risk = match self.estimator.predict(&snapshot) {
            Ok(risk) => {
                self.consecutive_failures = 0;
                risk
            }
            Err(e) => {
                self.consecutive_failures += 1;
                error!(
                    error = %e,
                    consecutive = self.consecutive_failures,
                    "Prediction failed, skipping cycle"
                );
                report.prediction_error = Some(e);

                let limit = self.config.engine.max_consecutive_prediction_failures;
                if limit > 0 && self.consecutive_failures >= limit {
                    return Err(EngineError::EstimatorUnusable(self.consecutive_failures));
                }
                return Ok(report);
            }
        };
        report.estimate = Some(RiskEstimate {
            value: risk,
            produced_at: now,
        });

        // 4. Trend + publish
        let change = self.trend.record(now, risk);
        let status = self.thresholds.classify(risk);
        let decision = Decision::new(risk, change, record.blr, status, now);
        info!(
            risk = %format!("{:.4}", risk),
            change_24h = decision.change_24h,
            status = %status,
            "🧠 Risk score"
        );
        report.published = self.publisher.publish(&decision).await;
        report.decision = Some(decision);

        // 5. Crash response
        report.crash = match self.coordinator.evaluate(risk, &record, &snapshot, now).await {
            CrashEvaluation::Responded(response) => Some(response),
            _ => None,
        };

        Ok(report)
    }

    /// Run until `shutdown` flips to true (or its sender is dropped).
    ///
    /// Fixed-delay scheduling: the interval is slept after each cycle
    /// completes. A shutdown during a cycle abandons it; a running proof
    /// backend is killed when its future is dropped.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), EngineError> {
        self.state = EngineState::Running;
        let interval = self.config.interval();
        info!(interval_ms = interval.as_millis() as u64, "🚀 Sentinel is now running");

        let result = loop {
            if *shutdown.borrow() {
                break Ok(());
            }

            tokio::select! {
                cycle = self.run_cycle() => {
                    if let Err(e) = cycle {
                        error!(error = %e, "Fatal engine error");
                        break Err(e);
                    }
                }
                _ = shutdown.changed() => {
                    warn!("Shutdown requested during cycle, abandoning it");
                    break Ok(());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                }
            }
        };

        self.state = EngineState::Stopped;
        info!(iterations = self.iteration, "Sentinel stopped");
        result
    }
}

impl fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("state", &self.state)
            .field("iteration", &self.iteration)
            .field("buffered", &self.buffer.len())
            .field("estimator", &self.estimator)
            .finish()
    }
}
