//! Compliance verification orchestration.
//!
//! A subject proves compliance with a proof over off-chain data before it may
//! perform a guarded action. The orchestrator routes that proof to one or
//! more interchangeable backends, enforces single use of each proof, and
//! caches per-subject acceptances.
//!
//! ## Module overview
//!
//! - [`backend`]: The `VerificationBackend` trait and submission/verdict types.
//! - [`proof`]: Oracle-checked cryptographic proofs.
//! - [`consensus`]: Adapter onto the multi-voter quorum coordinator.
//! - [`compute`]: Asynchronous jobs on an external compute service.
//! - [`orchestrator`]: The workflow engine and its builder.
//! - [`mode`]: Single-backend and fallback-chain modes.
//! - [`workflow`]: Per-evaluation audit records.
//! - [`replay`]: Single-use proof fingerprints.
//! - [`cache`]: Per-subject compliance cache.
//! - [`gate`]: The guarded-action decision seam.
//! - [`config`]: TOML configuration.
//! - [`error`]: Verification and backend error types.

pub mod backend;
pub mod cache;
pub mod compute;
pub mod config;
pub mod consensus;
pub mod error;
pub mod gate;
pub mod mode;
pub mod orchestrator;
pub mod proof;
pub mod replay;
pub mod workflow;

pub use backend::{BackendKind, BackendVerdict, ProofPayload, ProofSubmission, VerificationBackend};
pub use cache::{ComplianceCache, ComplianceRecord};
pub use compute::{ComputeBackend, ComputeService, ComputeStatus, JobId};
pub use config::{ModeConfig, ModeKind, OrchestratorConfig};
pub use consensus::ConsensusBackend;
pub use error::{BackendError, VerificationError};
pub use gate::{ActionGate, GateDecision, RejectReason};
pub use mode::{VerificationMode, MAX_CHAIN_LEN};
pub use orchestrator::{Evaluation, OrchestratorBuilder, WorkflowOrchestrator};
pub use proof::{OracleOutput, ProofBackend, ProofOracle};
pub use replay::{AlreadyUsed, ReplayGuard, ReplaySnapshot};
pub use workflow::{AttemptOutcome, AttemptRecord, Workflow, WorkflowState};
