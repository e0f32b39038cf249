//! Crash response and proof generation
//!
//! - `process`: run one external prover with a hard wall-clock limit
//! - `backend`: the prover variants (prove script, zkVM host binary)
//! - `coordinator`: persist the trigger, invoke the backend, report

pub mod backend;
pub mod coordinator;
pub mod process;

pub use backend::{build_backend, ProofBackend, ScriptBackend, ZkVmHostBackend};
pub use coordinator::{CoordinatorState, CrashEvaluation, CrashResponse, CrashResponseCoordinator};
