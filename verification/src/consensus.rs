//! Consensus backend: routes proofs to the quorum coordinator.
//!
//! The first attempt for a proof opens a consensus request and reports
//! `Pending`. Later attempts for the same proof read that request's state,
//! so a caller re-invokes the orchestrator once enough voters have voted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use warden_consensus::{
    ConsensusCoordinator, ConsensusError, RequestState, Verdict, VerificationRequest, VoteResult,
};
use warden_types::{AccountId, Fingerprint, RequestId, Timestamp};

use crate::backend::{BackendKind, BackendVerdict, ProofSubmission, VerificationBackend};
use crate::error::BackendError;

pub struct ConsensusBackend {
    coordinator: Arc<ConsensusCoordinator>,
    /// Proof fingerprint -> the request opened for it.
    requests: Mutex<HashMap<Fingerprint, RequestId>>,
}

impl ConsensusBackend {
    pub fn new(coordinator: Arc<ConsensusCoordinator>) -> Self {
        Self {
            coordinator,
            requests: Mutex::new(HashMap::new()),
        }
    }

    pub fn coordinator(&self) -> &Arc<ConsensusCoordinator> {
        &self.coordinator
    }

    /// The request opened for `proof_fingerprint`, if any.
    pub fn request_for(&self, proof_fingerprint: &Fingerprint) -> Option<RequestId> {
        self.lock_requests().get(proof_fingerprint).copied()
    }

    /// Cast a vote on an open request.
    pub fn vote(
        &self,
        request_id: &RequestId,
        voter: AccountId,
        verdict: Verdict,
        result_fingerprint: Fingerprint,
        reason: Option<String>,
    ) -> Result<VoteResult, ConsensusError> {
        self.coordinator
            .submit_vote(request_id, voter, verdict, result_fingerprint, reason)
    }

    pub fn status(&self, request_id: &RequestId) -> Result<RequestState, ConsensusError> {
        self.coordinator.check_timeout(request_id)
    }

    /// Reopen the request for `proof_fingerprint` after a failure or timeout.
    pub fn retry(&self, proof_fingerprint: &Fingerprint) -> Result<u32, ConsensusError> {
        let request_id = self
            .request_for(proof_fingerprint)
            .ok_or_else(|| ConsensusError::RequestNotFound(proof_fingerprint.to_string()))?;
        let result = self.coordinator.retry(&request_id);
        if let Err(ConsensusError::RequestNotFound(_)) = result {
            self.forget(proof_fingerprint, &request_id);
        }
        result
    }

    /// Prune decided requests on the coordinator and drop the proofs that
    /// pointed at them. Returns the number of requests removed.
    pub fn prune_finalized(&self, older_than: Timestamp) -> usize {
        let mut requests = self.lock_requests();
        let pruned = self.coordinator.prune_finalized(older_than);
        requests.retain(|_, id| self.coordinator.contains(id));
        pruned
    }

    /// Drop the entry for `proof_fingerprint` if it still maps to `request_id`.
    fn forget(&self, proof_fingerprint: &Fingerprint, request_id: &RequestId) {
        let mut requests = self.lock_requests();
        if requests.get(proof_fingerprint) == Some(request_id) {
            requests.remove(proof_fingerprint);
        }
    }

    fn open(
        &self,
        requests: &mut HashMap<Fingerprint, RequestId>,
        submission: &ProofSubmission<'_>,
    ) -> RequestId {
        let id = self.coordinator.submit_request(
            submission.subject.clone(),
            submission.proof_fingerprint,
            submission.payload.proof.clone(),
        );
        requests.insert(submission.proof_fingerprint, id);
        debug!(request = %id, subject = %submission.subject, "opened consensus request");
        id
    }

    fn lock_requests(&self) -> MutexGuard<'_, HashMap<Fingerprint, RequestId>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn interpret(request: &VerificationRequest, expected: &Fingerprint) -> BackendVerdict {
        match request.state() {
            RequestState::Pending | RequestState::Processing | RequestState::Retrying => {
                BackendVerdict::Pending {
                    request_id: request.request_id(),
                }
            }
            RequestState::Verified => match request.result() {
                Some(result) if &result.result_fingerprint == expected => BackendVerdict::Valid {
                    result_fingerprint: result.result_fingerprint,
                },
                Some(result) => BackendVerdict::result_mismatch(&result.result_fingerprint, expected),
                None => BackendVerdict::Invalid {
                    reason: "verified request has no result".into(),
                },
            },
            RequestState::Failed => BackendVerdict::Invalid {
                reason: request
                    .result()
                    .map(|r| format!("consensus failed: {}", r.reason))
                    .unwrap_or_else(|| "consensus failed".into()),
            },
            RequestState::Timeout => BackendVerdict::Invalid {
                reason: "consensus request timed out".into(),
            },
        }
    }
}

impl VerificationBackend for ConsensusBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Consensus
    }

    fn verify(
        &self,
        submission: &ProofSubmission<'_>,
        expected: &Fingerprint,
    ) -> Result<BackendVerdict, BackendError> {
        submission.ensure_bound()?;

        // Held across submit so two attempts for one proof share a request.
        let request = {
            let mut requests = self.lock_requests();
            let stored = requests.get(&submission.proof_fingerprint).copied();
            let request = match stored.map(|id| (id, self.coordinator.get(&id))) {
                Some((_, Ok(request))) => Some(request),
                Some((id, Err(ConsensusError::RequestNotFound(_)))) => {
                    debug!(request = %id, "consensus request was pruned, reopening");
                    None
                }
                Some((_, Err(e))) => return Err(e.into()),
                None => None,
            };
            match request {
                Some(request) => request,
                None => {
                    let request_id = self.open(&mut requests, submission);
                    return Ok(BackendVerdict::Pending { request_id });
                }
            }
        };

        if request.subject() != submission.subject {
            return Err(BackendError::IdentityMismatch {
                subject: submission.subject.to_string(),
                bound: request.subject().to_string(),
            });
        }
        Ok(Self::interpret(&request, expected))
    }
}
