//! Workflow orchestrator: routes a proof through the configured backend
//! chain and turns the outcome into a gate decision.
//!
//! Order of checks for every evaluation:
//! 1. caller input (subject, proof bytes, fingerprint binding)
//! 2. compliance cache fast path
//! 3. replay guard
//! 4. backends, strictly in chain order

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};
use warden_crypto::{derive_workflow_id, fingerprint_of};
use warden_types::{AccountId, Clock, Fingerprint, RequestId, SystemClock, Timestamp};
use warden_utils::StatsCounter;

use crate::backend::{
    BackendKind, BackendVerdict, ProofPayload, ProofSubmission, VerificationBackend,
};
use crate::cache::ComplianceCache;
use crate::config::OrchestratorConfig;
use crate::error::{BackendError, VerificationError};
use crate::gate::{ActionGate, GateDecision, RejectReason};
use crate::mode::VerificationMode;
use crate::replay::ReplayGuard;
use crate::workflow::{AttemptOutcome, Workflow, WorkflowState};

pub const STAT_ACCEPTED: &str = "accepted";
pub const STAT_REJECTED: &str = "rejected";
pub const STAT_PENDING: &str = "pending";
pub const STAT_CACHE_HITS: &str = "cache_hits";
pub const STAT_REPLAYS_BLOCKED: &str = "replays_blocked";
pub const STAT_BACKEND_ERRORS: &str = "backend_errors";

const STAT_NAMES: &[&str] = &[
    STAT_ACCEPTED,
    STAT_REJECTED,
    STAT_PENDING,
    STAT_CACHE_HITS,
    STAT_REPLAYS_BLOCKED,
    STAT_BACKEND_ERRORS,
];

/// The decision for one evaluation together with its audit record.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub decision: GateDecision,
    pub workflow: Workflow,
}

impl Evaluation {
    pub fn permits_action(&self) -> bool {
        self.decision.permits_action()
    }
}

// ── Builder ────────────────────────────────────────────────────────────

pub struct OrchestratorBuilder {
    admin: AccountId,
    mode: VerificationMode,
    fallback_enabled: bool,
    expected: Fingerprint,
    audit_capacity: usize,
    backends: Vec<Arc<dyn VerificationBackend>>,
    clock: Arc<dyn Clock>,
    replay: ReplayGuard,
    cache: ComplianceCache,
}

impl OrchestratorBuilder {
    pub fn new(mode: VerificationMode) -> Self {
        let defaults = OrchestratorConfig::default();
        Self {
            admin: defaults.admin,
            mode,
            fallback_enabled: defaults.fallback_enabled,
            expected: Fingerprint::ZERO,
            audit_capacity: defaults.audit_capacity,
            backends: Vec::new(),
            clock: Arc::new(SystemClock),
            replay: ReplayGuard::new(),
            cache: ComplianceCache::new(),
        }
    }

    /// Start from a validated configuration. Backends still have to be
    /// registered.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, VerificationError> {
        config.validate()?;
        Ok(Self::new(config.mode.to_mode()?)
            .admin(config.admin.clone())
            .fallback_enabled(config.fallback_enabled)
            .expected_fingerprint(config.expected()?)
            .audit_capacity(config.audit_capacity))
    }

    pub fn admin(mut self, admin: AccountId) -> Self {
        self.admin = admin;
        self
    }

    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    pub fn expected_fingerprint(mut self, expected: Fingerprint) -> Self {
        self.expected = expected;
        self
    }

    pub fn audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn VerificationBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Carry over consumed fingerprints, e.g. from a restored snapshot.
    pub fn replay_guard(mut self, replay: ReplayGuard) -> Self {
        self.replay = replay;
        self
    }

    pub fn cache(mut self, cache: ComplianceCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn build(self) -> Result<WorkflowOrchestrator, VerificationError> {
        self.mode.validate()?;
        if !self.admin.is_valid() {
            return Err(VerificationError::Config(format!(
                "invalid admin identifier {:?}",
                self.admin.as_str()
            )));
        }

        let mut registry: HashMap<BackendKind, Arc<dyn VerificationBackend>> = HashMap::new();
        for backend in self.backends {
            let kind = backend.kind();
            if registry.insert(kind, backend).is_some() {
                return Err(VerificationError::DuplicateBackend(kind));
            }
        }
        if let Some(missing) = self.mode.chain().iter().find(|k| !registry.contains_key(*k)) {
            return Err(VerificationError::MissingBackend(*missing));
        }
        if self.expected.is_zero() {
            warn!("no expected fingerprint configured; nothing will be accepted until one is set");
        }

        info!(
            mode = ?self.mode,
            fallback = self.fallback_enabled,
            "workflow orchestrator ready"
        );
        Ok(WorkflowOrchestrator {
            admin: self.admin,
            mode: self.mode,
            fallback_enabled: self.fallback_enabled,
            backends: registry,
            expected: RwLock::new(self.expected),
            replay: self.replay,
            cache: self.cache,
            clock: self.clock,
            nonce: AtomicU64::new(0),
            audit_capacity: self.audit_capacity,
            recent: Mutex::new(VecDeque::new()),
            stats: StatsCounter::new(STAT_NAMES),
        })
    }
}

// ── Orchestrator ───────────────────────────────────────────────────────

pub struct WorkflowOrchestrator {
    admin: AccountId,
    mode: VerificationMode,
    fallback_enabled: bool,
    backends: HashMap<BackendKind, Arc<dyn VerificationBackend>>,
    expected: RwLock<Fingerprint>,
    replay: ReplayGuard,
    cache: ComplianceCache,
    clock: Arc<dyn Clock>,
    nonce: AtomicU64,
    audit_capacity: usize,
    recent: Mutex<VecDeque<Workflow>>,
    stats: StatsCounter,
}

/// How the backend loop ended.
enum ChainEnd {
    Verified(Fingerprint),
    Pending(RequestId),
    Aborted(BackendError),
    Exhausted { stopped_early: bool },
}

impl WorkflowOrchestrator {
    pub fn builder(mode: VerificationMode) -> OrchestratorBuilder {
        OrchestratorBuilder::new(mode)
    }

    pub fn mode(&self) -> &VerificationMode {
        &self.mode
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled
    }

    pub fn expected_fingerprint(&self) -> Fingerprint {
        *self.expected.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the compliance fingerprint proofs must attest to.
    pub fn set_expected_fingerprint(
        &self,
        caller: &AccountId,
        fingerprint: Fingerprint,
    ) -> Result<(), VerificationError> {
        if caller != &self.admin {
            warn!(caller = %caller, "rejected expected fingerprint change from non-admin");
            return Err(VerificationError::Unauthorized(caller.to_string()));
        }
        let mut expected = self.expected.write().unwrap_or_else(|e| e.into_inner());
        let old = *expected;
        *expected = fingerprint;
        info!(old = %old, new = %fingerprint, "expected fingerprint changed");
        Ok(())
    }

    pub fn replay_guard(&self) -> &ReplayGuard {
        &self.replay
    }

    pub fn cache(&self) -> &ComplianceCache {
        &self.cache
    }

    pub fn stats(&self) -> BTreeMap<&'static str, u64> {
        self.stats.snapshot()
    }

    /// Log every counter as a single `info` event.
    pub fn log_stats(&self) {
        self.stats.log_summary("orchestrator");
    }

    pub fn stat(&self, name: &str) -> u64 {
        self.stats.get(name)
    }

    /// Most recent finished workflows, oldest first.
    pub fn recent_workflows(&self) -> Vec<Workflow> {
        self.recent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// Decide whether `subject` may perform the guarded action.
    pub fn evaluate(
        &self,
        subject: &AccountId,
        proof_fingerprint: &Fingerprint,
        payload: &ProofPayload,
    ) -> Evaluation {
        let now = self.clock.now();
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut workflow = Workflow::start(
            derive_workflow_id(subject, proof_fingerprint, nonce),
            subject.clone(),
            *proof_fingerprint,
            self.mode.clone(),
            self.fallback_enabled,
            now,
        );
        let decision = self.run(&mut workflow, payload);

        match &decision {
            GateDecision::Accept => self.stats.increment(STAT_ACCEPTED),
            GateDecision::Reject(_) => self.stats.increment(STAT_REJECTED),
            GateDecision::Pending(_) => self.stats.increment(STAT_PENDING),
        }
        debug!(
            workflow = %workflow.workflow_id,
            subject = %subject,
            state = ?workflow.state,
            attempts = workflow.attempts.len(),
            "workflow finished"
        );
        self.remember(workflow.clone());
        Evaluation { decision, workflow }
    }

    fn run(&self, workflow: &mut Workflow, payload: &ProofPayload) -> GateDecision {
        let subject = workflow.subject.clone();
        let proof_fingerprint = workflow.proof_fingerprint;

        if let Err(reason) = self.check_input(&subject, &proof_fingerprint, payload) {
            let note = match &reason {
                RejectReason::InvalidInput(s) | RejectReason::IdentityMismatch(s) => s.clone(),
                other => format!("{other:?}"),
            };
            warn!(workflow = %workflow.workflow_id, subject = %subject, "rejected input: {note}");
            workflow.finish(WorkflowState::Failed, self.clock.now(), Some(note));
            return GateDecision::Reject(reason);
        }

        let expected = self.expected_fingerprint();
        if self.cache.is_compliant(&subject, &expected) {
            self.stats.increment(STAT_CACHE_HITS);
            debug!(workflow = %workflow.workflow_id, subject = %subject, "compliance cache hit");
            workflow.finish(
                WorkflowState::Verified,
                self.clock.now(),
                Some("compliance cache hit".into()),
            );
            return GateDecision::Accept;
        }

        if self.replay.contains(&proof_fingerprint) {
            return self.block_replay(workflow);
        }

        let submission = ProofSubmission {
            subject: &subject,
            proof_fingerprint,
            payload,
        };
        match self.run_chain(workflow, &submission, &expected) {
            ChainEnd::Verified(result_fingerprint) => {
                // Only the winner of the mark gets to update the cache.
                if self.replay.mark_used(proof_fingerprint).is_err() {
                    return self.block_replay(workflow);
                }
                let now = self.clock.now();
                self.cache.set(subject.clone(), result_fingerprint, now);
                info!(workflow = %workflow.workflow_id, subject = %subject, "subject verified");
                workflow.finish(WorkflowState::Verified, now, None);
                GateDecision::Accept
            }
            ChainEnd::Pending(request_id) => {
                debug!(workflow = %workflow.workflow_id, request = %request_id, "verification pending");
                workflow.finish(WorkflowState::Pending, self.clock.now(), None);
                GateDecision::Pending(request_id)
            }
            ChainEnd::Aborted(err) => {
                let reason = match &err {
                    BackendError::AlreadyUsed(_) => {
                        self.stats.increment(STAT_REPLAYS_BLOCKED);
                        RejectReason::ProofAlreadyUsed
                    }
                    other => RejectReason::IdentityMismatch(other.to_string()),
                };
                warn!(workflow = %workflow.workflow_id, subject = %subject, "workflow aborted: {err}");
                workflow.finish(WorkflowState::Failed, self.clock.now(), Some(err.to_string()));
                GateDecision::Reject(reason)
            }
            ChainEnd::Exhausted { stopped_early } => {
                let last = workflow
                    .last_attempt()
                    .and_then(|a| a.outcome.reason())
                    .unwrap_or("no backend verified the proof")
                    .to_string();
                let note = stopped_early.then(|| "fallback disabled".to_string());
                info!(workflow = %workflow.workflow_id, subject = %subject, "verification failed: {last}");
                workflow.finish(WorkflowState::Failed, self.clock.now(), note);
                GateDecision::Reject(RejectReason::VerificationFailed(last))
            }
        }
    }

    fn run_chain(
        &self,
        workflow: &mut Workflow,
        submission: &ProofSubmission<'_>,
        expected: &Fingerprint,
    ) -> ChainEnd {
        let chain = self.mode.chain();
        for (index, kind) in chain.iter().enumerate() {
            if index > 0 && !self.fallback_enabled {
                return ChainEnd::Exhausted {
                    stopped_early: true,
                };
            }
            // Presence of every chain entry is checked at build time.
            let Some(backend) = self.backends.get(kind) else {
                continue;
            };

            let result = backend.verify(submission, expected);
            let now = self.clock.now();
            match result {
                Ok(BackendVerdict::Valid { result_fingerprint })
                    if &result_fingerprint != expected =>
                {
                    let reason = format!(
                        "backend vouched for {result_fingerprint}, expected {expected}"
                    );
                    warn!(workflow = %workflow.workflow_id, backend = ?kind, "{reason}");
                    workflow.record(*kind, AttemptOutcome::Rejected { reason }, now);
                }
                Ok(BackendVerdict::Valid { result_fingerprint }) => {
                    debug!(workflow = %workflow.workflow_id, backend = ?kind, "backend verified");
                    workflow.record(*kind, AttemptOutcome::Verified { result_fingerprint }, now);
                    return ChainEnd::Verified(result_fingerprint);
                }
                Ok(BackendVerdict::Invalid { reason }) => {
                    debug!(workflow = %workflow.workflow_id, backend = ?kind, "backend rejected: {reason}");
                    workflow.record(*kind, AttemptOutcome::Rejected { reason }, now);
                }
                Ok(BackendVerdict::Pending { request_id }) => {
                    debug!(workflow = %workflow.workflow_id, backend = ?kind, request = %request_id, "backend pending");
                    workflow.record(*kind, AttemptOutcome::Pending { request_id }, now);
                    return ChainEnd::Pending(request_id);
                }
                Err(err) => {
                    self.stats.increment(STAT_BACKEND_ERRORS);
                    let aborted = err.aborts_workflow();
                    workflow.record(
                        *kind,
                        AttemptOutcome::Errored {
                            reason: err.to_string(),
                            aborted,
                        },
                        now,
                    );
                    if aborted {
                        return ChainEnd::Aborted(err);
                    }
                    warn!(workflow = %workflow.workflow_id, backend = ?kind, "backend error: {err}");
                }
            }
        }
        ChainEnd::Exhausted {
            stopped_early: false,
        }
    }

    fn check_input(
        &self,
        subject: &AccountId,
        proof_fingerprint: &Fingerprint,
        payload: &ProofPayload,
    ) -> Result<(), RejectReason> {
        if !subject.is_valid() {
            return Err(RejectReason::InvalidInput(format!(
                "invalid subject {:?}",
                subject.as_str()
            )));
        }
        if proof_fingerprint.is_zero() {
            return Err(RejectReason::InvalidInput("proof fingerprint is zero".into()));
        }
        if payload.proof.is_empty() {
            return Err(RejectReason::InvalidInput("proof bytes are empty".into()));
        }
        if &fingerprint_of(&payload.proof) != proof_fingerprint {
            return Err(RejectReason::InvalidInput(
                "proof fingerprint does not match proof bytes".into(),
            ));
        }
        if &payload.bound_subject != subject {
            return Err(RejectReason::IdentityMismatch(format!(
                "proof is bound to {}, not to {subject}",
                payload.bound_subject
            )));
        }
        Ok(())
    }

    fn block_replay(&self, workflow: &mut Workflow) -> GateDecision {
        self.stats.increment(STAT_REPLAYS_BLOCKED);
        warn!(
            workflow = %workflow.workflow_id,
            subject = %workflow.subject,
            proof = %workflow.proof_fingerprint,
            "proof replay blocked"
        );
        workflow.finish(
            WorkflowState::Failed,
            self.clock.now(),
            Some("proof already used".into()),
        );
        GateDecision::Reject(RejectReason::ProofAlreadyUsed)
    }

    fn remember(&self, workflow: Workflow) {
        if self.audit_capacity == 0 {
            return;
        }
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        while recent.len() >= self.audit_capacity {
            recent.pop_front();
        }
        recent.push_back(workflow);
    }

    /// Current time on the orchestrator's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

impl ActionGate for WorkflowOrchestrator {
    fn decide(
        &self,
        subject: &AccountId,
        proof_fingerprint: &Fingerprint,
        payload: &ProofPayload,
    ) -> GateDecision {
        self.evaluate(subject, proof_fingerprint, payload).decision
    }
}
