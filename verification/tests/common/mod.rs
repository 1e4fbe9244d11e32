//! Test doubles for the external collaborators of the verification backends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use warden_consensus::{ConsensusConfig, ConsensusCoordinator};
use warden_crypto::fingerprint_of;
use warden_nullables::NullClock;
use warden_types::{AccountId, Fingerprint};
use warden_verification::{
    BackendError, ComputeService, ComputeStatus, JobId, OracleOutput, ProofOracle, ProofPayload,
};

pub const ADMIN: &str = "admin";

pub fn expected() -> Fingerprint {
    Fingerprint::new([0xc0; 32])
}

/// A subject, its proof fingerprint, and a payload bound to it.
pub fn proof_for(subject: &str, bytes: &[u8]) -> (AccountId, Fingerprint, ProofPayload) {
    let subject = AccountId::new(subject);
    let payload = ProofPayload::new(subject.clone(), bytes.to_vec(), b"inputs".to_vec());
    (subject, fingerprint_of(bytes), payload)
}

pub fn coordinator(clock: Arc<NullClock>, voters: &[&str], quorum: u32) -> Arc<ConsensusCoordinator> {
    let config = ConsensusConfig::with_voters(
        AccountId::new(ADMIN),
        voters.iter().map(|v| AccountId::new(*v)),
        quorum,
    );
    Arc::new(ConsensusCoordinator::new(config, clock).expect("valid consensus config"))
}

// ── Proof oracle ───────────────────────────────────────────────────────

/// Answers every payload the same way. `None` simulates an oracle outage.
pub struct FixedOracle {
    output: Option<OracleOutput>,
    calls: AtomicUsize,
}

impl FixedOracle {
    pub fn accepting(result_fingerprint: Fingerprint) -> Arc<Self> {
        Arc::new(Self {
            output: Some(OracleOutput {
                valid: true,
                result_fingerprint,
            }),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            output: Some(OracleOutput {
                valid: false,
                result_fingerprint: Fingerprint::ZERO,
            }),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn offline() -> Arc<Self> {
        Arc::new(Self {
            output: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProofOracle for FixedOracle {
    fn check(&self, _payload: &ProofPayload) -> Result<OracleOutput, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.output
            .ok_or_else(|| BackendError::Oracle("oracle offline".into()))
    }
}

// ── Compute service ────────────────────────────────────────────────────

/// Jobs stay `Running` until the test completes them.
#[derive(Default)]
pub struct ManualCompute {
    next: AtomicU64,
    jobs: Mutex<HashMap<JobId, ComputeStatus>>,
}

impl ManualCompute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn complete(&self, job: &JobId, status: ComputeStatus) {
        self.jobs.lock().unwrap().insert(*job, status);
    }

    pub fn submitted(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl ComputeService for ManualCompute {
    fn submit(
        &self,
        _subject: &AccountId,
        _proof_fingerprint: &Fingerprint,
        _payload: &ProofPayload,
    ) -> Result<JobId, BackendError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&n.to_le_bytes());
        bytes[31] = 1;
        let job = JobId::new(bytes);
        self.jobs.lock().unwrap().insert(job, ComputeStatus::Running);
        Ok(job)
    }

    fn poll(&self, job: &JobId) -> Result<ComputeStatus, BackendError> {
        self.jobs
            .lock()
            .unwrap()
            .get(job)
            .cloned()
            .ok_or_else(|| BackendError::Service(format!("unknown job {job}")))
    }
}
