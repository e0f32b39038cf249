//! Crash-response coordinator
//!
//! On a crash-threshold breach: persist the trigger, run the proof backend
//! under its timeout, report the outcome. Everything completes inside the
//! calling cycle.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::backend::ProofBackend;
use crate::error::ProofError;
use crate::persistence::write_json_atomic_timeout;
use crate::risk::RiskThresholds;
use crate::types::{CrashTrigger, FeatureRecord, NormalizedFeatureRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Persisting,
    Proving,
    Succeeded,
    Failed,
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoordinatorState::Idle => "idle",
            CoordinatorState::Persisting => "persisting",
            CoordinatorState::Proving => "proving",
            CoordinatorState::Succeeded => "succeeded",
            CoordinatorState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Result of one crash response
#[derive(Debug)]
pub struct CrashResponse {
    pub trigger_id: Uuid,
    pub risk_score: f64,
    /// Every state visited, starting at Idle
    pub trail: Vec<CoordinatorState>,
    pub trigger_path: Option<PathBuf>,
    pub result: Result<PathBuf, ProofError>,
    pub elapsed: Duration,
}

impl CrashResponse {
    pub fn final_state(&self) -> CoordinatorState {
        self.trail.last().copied().unwrap_or(CoordinatorState::Idle)
    }

    pub fn succeeded(&self) -> bool {
        self.final_state() == CoordinatorState::Succeeded
    }
}

/// What the coordinator did this cycle
#[derive(Debug)]
pub enum CrashEvaluation {
    /// Risk at or below the warning threshold
    Normal,
    /// Above warning, at or below crash: logged only
    Elevated,
    /// Above crash but a proof was already attempted for this excursion
    Suppressed,
    Responded(CrashResponse),
}

impl CrashEvaluation {
    pub fn response(&self) -> Option<&CrashResponse> {
        match self {
            CrashEvaluation::Responded(r) => Some(r),
            _ => None,
        }
    }
}

pub struct CrashResponseCoordinator {
    thresholds: RiskThresholds,
    trigger_path: PathBuf,
    backend: Box<dyn ProofBackend>,
    io_timeout: Duration,
    rearm_below_threshold: bool,
    /// Set once a proof was attempted; cleared when risk falls back
    fired: bool,
    state: CoordinatorState,
}

impl CrashResponseCoordinator {
    pub fn new(
        thresholds: RiskThresholds,
        trigger_path: impl Into<PathBuf>,
        backend: Box<dyn ProofBackend>,
        io_timeout: Duration,
    ) -> Self {
        Self {
            thresholds,
            trigger_path: trigger_path.into(),
            backend,
            io_timeout,
            rearm_below_threshold: false,
            fired: false,
            state: CoordinatorState::Idle,
        }
    }

    /// Fire once per excursion above the crash threshold instead of every cycle
    pub fn with_rearm_below_threshold(mut self, enabled: bool) -> Self {
        self.rearm_below_threshold = enabled;
        self
    }

    /// Terminal state of the last response, or Idle
    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn trigger_path(&self) -> &Path {
        &self.trigger_path
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn evaluate(
        &mut self,
        risk: f64,
        record: &FeatureRecord,
        snapshot: &[NormalizedFeatureRecord],
        at: DateTime<Utc>,
    ) -> CrashEvaluation {
        if !self.thresholds.is_crash(risk) {
            self.fired = false;
            self.state = CoordinatorState::Idle;

            if risk > self.thresholds.warning {
                warn!(risk = %format!("{:.4}", risk), "⚡ High risk detected");
                return CrashEvaluation::Elevated;
            }
            info!(risk = %format!("{:.4}", risk), "✓ Risk score normal");
            return CrashEvaluation::Normal;
        }

        error!(
            risk = %format!("{:.4}", risk),
            threshold = self.thresholds.crash,
            "🚨 CRASH THRESHOLD EXCEEDED"
        );

        if self.rearm_below_threshold && self.fired {
            info!("Proof already attempted for this excursion, skipping");
            return CrashEvaluation::Suppressed;
        }
        self.fired = true;

        CrashEvaluation::Responded(self.respond(risk, record, snapshot, at).await)
    }

    async fn respond(
        &mut self,
        risk: f64,
        record: &FeatureRecord,
        snapshot: &[NormalizedFeatureRecord],
        at: DateTime<Utc>,
    ) -> CrashResponse {
        let started = Instant::now();
        let mut trail = vec![CoordinatorState::Idle];
        let trigger = CrashTrigger::new(at, risk, *record, snapshot);
        let trigger_id = trigger.trigger_id;

        self.transition(&mut trail, CoordinatorState::Persisting, trigger_id);
        if let Err(e) = write_json_atomic_timeout(&self.trigger_path, &trigger, self.io_timeout).await {
            let err = ProofError::Persist {
                path: self.trigger_path.clone(),
                reason: format!("{:#}", e),
            };
            error!(trigger_id = %trigger_id, error = %err, "Failed to save crash input");
            self.transition(&mut trail, CoordinatorState::Failed, trigger_id);
            return CrashResponse {
                trigger_id,
                risk_score: risk,
                trail,
                trigger_path: None,
                result: Err(err),
                elapsed: started.elapsed(),
            };
        }
        info!(
            trigger_id = %trigger_id,
            path = %self.trigger_path.display(),
            steps = trigger.sequence_len(),
            digest = %trigger.input_digest,
            "Crash input saved"
        );

        self.transition(&mut trail, CoordinatorState::Proving, trigger_id);
        let result = self.backend.invoke(&self.trigger_path).await;

        match &result {
            Ok(artifact) => {
                info!(
                    trigger_id = %trigger_id,
                    backend = self.backend.name(),
                    artifact = %artifact.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "✅ ZK PROOF GENERATED"
                );
                self.transition(&mut trail, CoordinatorState::Succeeded, trigger_id);
            }
            Err(e) => {
                error!(
                    trigger_id = %trigger_id,
                    backend = self.backend.name(),
                    error = %e,
                    "Proof generation failed"
                );
                self.transition(&mut trail, CoordinatorState::Failed, trigger_id);
            }
        }

        CrashResponse {
            trigger_id,
            risk_score: risk,
            trail,
            trigger_path: Some(self.trigger_path.clone()),
            result,
            elapsed: started.elapsed(),
        }
    }

    fn transition(&mut self, trail: &mut Vec<CoordinatorState>, next: CoordinatorState, id: Uuid) {
        tracing::debug!(trigger_id = %id, from = %self.state, to = %next, "Coordinator transition");
        self.state = next;
        trail.push(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proof::backend::MockProofBackend;
    use CoordinatorState::*;

    fn snapshot(n: usize) -> Vec<NormalizedFeatureRecord> {
        (0..n)
            .map(|i| NormalizedFeatureRecord {
                blr: i as f64 / n as f64,
                buy_volume: 0.5,
                sell_volume: 0.5,
                mid_price: 0.5,
            })
            .collect()
    }

    fn coordinator(dir: &Path, backend: MockProofBackend) -> CrashResponseCoordinator {
        CrashResponseCoordinator::new(
            RiskThresholds::default(),
            dir.join("crash_input.json"),
            Box::new(backend),
            Duration::from_secs(2),
        )
    }

    fn never_called() -> MockProofBackend {
        let mut mock = MockProofBackend::new();
        mock.expect_invoke().never();
        mock.expect_name().return_const("mock");
        mock
    }

    #[tokio::test]
    async fn test_below_crash_takes_no_action() {
        let dir = tempfile::tempdir().unwrap();
        let mut c = coordinator(dir.path(), never_called());
        let rec = FeatureRecord::default();

        assert!(matches!(
            c.evaluate(0.3, &rec, &snapshot(4), Utc::now()).await,
            CrashEvaluation::Normal
        ));
        assert!(matches!(
            c.evaluate(0.8, &rec, &snapshot(4), Utc::now()).await,
            CrashEvaluation::Elevated
        ));
        assert!(!dir.path().join("crash_input.json").exists());
        assert_eq!(c.state(), Idle);
    }

    #[tokio::test]
    async fn test_breach_persists_then_proves() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("proof.json");
        let expected_input = dir.path().join("crash_input.json");

        let mut mock = MockProofBackend::new();
        mock.expect_name().return_const("mock");
        let a = artifact.clone();
        mock.expect_invoke()
            .withf(move |p| p == expected_input.as_path())
            .times(1)
            .returning(move |_| Ok(a.clone()));

        let mut c = coordinator(dir.path(), mock);
        let snap = snapshot(60);
        let eval = c
            .evaluate(0.93, &FeatureRecord::new(0.31, 100.0, 9000.0, 2600.0), &snap, Utc::now())
            .await;

        let resp = eval.response().expect("should respond");
        assert_eq!(resp.trail, vec![Idle, Persisting, Proving, Succeeded]);
        assert!(resp.succeeded());
        assert_eq!(resp.result.as_ref().unwrap(), &artifact);
        assert_eq!(c.state(), Succeeded);

        let saved: CrashTrigger = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("crash_input.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved.trigger_id, resp.trigger_id);
        assert_eq!(saved.input_tensor.len(), 60);
        assert_eq!(saved.input_tensor[59], snap[59].to_array());
        assert!(saved.verify_digest());
        assert_eq!(saved.features.blr, 0.31);
    }

    #[tokio::test]
    async fn test_backend_failure_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockProofBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_invoke()
            .times(1)
            .returning(|_| Err(ProofError::Timeout(Duration::from_secs(60))));

        let mut c = coordinator(dir.path(), mock);
        let eval = c
            .evaluate(0.99, &FeatureRecord::default(), &snapshot(3), Utc::now())
            .await;
        let resp = eval.response().unwrap();

        assert_eq!(resp.trail, vec![Idle, Persisting, Proving, Failed]);
        assert!(matches!(resp.result, Err(ProofError::Timeout(_))));
        assert_eq!(c.state(), Failed);
    }

    #[tokio::test]
    async fn test_persist_failure_skips_proof() {
        let dir = tempfile::tempdir().unwrap();
        // Parent of the trigger path is a regular file
        let blocker = dir.path().join("zk-circuit");
        std::fs::write(&blocker, "").unwrap();

        let mut c = CrashResponseCoordinator::new(
            RiskThresholds::default(),
            blocker.join("crash_input.json"),
            Box::new(never_called()),
            Duration::from_secs(2),
        );
        let eval = c
            .evaluate(0.95, &FeatureRecord::default(), &snapshot(3), Utc::now())
            .await;
        let resp = eval.response().unwrap();

        assert_eq!(resp.trail, vec![Idle, Persisting, Failed]);
        assert!(matches!(resp.result, Err(ProofError::Persist { .. })));
        assert!(resp.trigger_path.is_none());
    }

    #[tokio::test]
    async fn test_fires_every_cycle_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockProofBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_invoke()
            .times(3)
            .returning(|p| Ok(p.to_path_buf()));

        let mut c = coordinator(dir.path(), mock);
        for _ in 0..3 {
            let eval = c
                .evaluate(0.9, &FeatureRecord::default(), &snapshot(2), Utc::now())
                .await;
            assert!(eval.response().is_some());
        }
    }

    #[tokio::test]
    async fn test_rearm_fires_once_per_excursion() {
        let dir = tempfile::tempdir().unwrap();
        let mut mock = MockProofBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_invoke()
            .times(2)
            .returning(|p| Ok(p.to_path_buf()));

        let mut c = coordinator(dir.path(), mock).with_rearm_below_threshold(true);
        let rec = FeatureRecord::default();
        let snap = snapshot(2);

        assert!(c.evaluate(0.9, &rec, &snap, Utc::now()).await.response().is_some());
        assert!(matches!(
            c.evaluate(0.95, &rec, &snap, Utc::now()).await,
            CrashEvaluation::Suppressed
        ));
        // Dropping to exactly the threshold re-arms
        c.evaluate(0.8, &rec, &snap, Utc::now()).await;
        assert!(c.evaluate(0.85, &rec, &snap, Utc::now()).await.response().is_some());
    }
}
