//! Consensus coordinator: owns every verification request and routes votes.
//!
//! Requests live in an `RwLock`-guarded map, each behind its own `Mutex`, so
//! votes on different requests proceed in parallel while the duplicate check,
//! append, quorum evaluation and transition for one request happen under a
//! single exclusive section.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, warn};
use warden_crypto::derive_request_id;
use warden_types::{AccountId, Clock, Fingerprint, RequestId, Timestamp};
use warden_utils::format_duration;

use crate::config::ConsensusConfig;
use crate::error::ConsensusError;
use crate::request::{
    RequestState, Verdict, VerificationRequest, VerificationResult, Vote, VoteResult,
    REJECT_FINALIZED, REJECT_TIMED_OUT,
};

type SharedRequest = Arc<Mutex<VerificationRequest>>;

/// Coordinates quorum voting across all consensus verification requests.
pub struct ConsensusCoordinator {
    config: RwLock<ConsensusConfig>,
    requests: RwLock<HashMap<RequestId, SharedRequest>>,
    nonce: AtomicU64,
    clock: Arc<dyn Clock>,
}

impl ConsensusCoordinator {
    /// Create a coordinator after validating its configuration.
    pub fn new(config: ConsensusConfig, clock: Arc<dyn Clock>) -> Result<Self, ConsensusError> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(config),
            requests: RwLock::new(HashMap::new()),
            nonce: AtomicU64::new(0),
            clock,
        })
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ConsensusConfig {
        self.read_config().clone()
    }

    /// The configured voting window in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.read_config().timeout_secs
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ── Requests ────────────────────────────────────────────────────────

    /// Register a new request in the Pending state.
    pub fn submit_request(
        &self,
        subject: AccountId,
        proof_fingerprint: Fingerprint,
        payload: Vec<u8>,
    ) -> RequestId {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let request_id = derive_request_id(&subject, &proof_fingerprint, nonce);
        let now = self.clock.now();
        debug!(request = %request_id, subject = %subject, proof = %proof_fingerprint, "consensus request submitted");
        let request = VerificationRequest::new(request_id, subject, proof_fingerprint, payload, now);
        self.write_requests()
            .insert(request_id, Arc::new(Mutex::new(request)));
        request_id
    }

    /// Record a vote from a roster member.
    ///
    /// Errors are local and recoverable: unknown request, voter not on the
    /// roster, or a second vote from the same voter in the current round.
    /// Votes on a decided or timed-out request are kept for audit and
    /// returned as [`VoteResult::Rejected`].
    pub fn submit_vote(
        &self,
        request_id: &RequestId,
        voter: AccountId,
        verdict: Verdict,
        result_fingerprint: Fingerprint,
        reason: Option<String>,
    ) -> Result<VoteResult, ConsensusError> {
        let (roster, quorum, timeout_secs) = {
            let config = self.read_config();
            (config.voters.clone(), config.quorum, config.timeout_secs)
        };
        let shared = self.lookup(request_id)?;
        let mut request = lock_request(&shared);

        if !roster.contains(&voter) {
            return Err(ConsensusError::UnknownVoter(voter.to_string()));
        }
        if request.has_voted(&voter) {
            return Err(ConsensusError::DuplicateVoter {
                voter: voter.to_string(),
                request: request_id.to_string(),
            });
        }

        let now = self.clock.now();
        let vote = Vote {
            voter,
            request_id: *request_id,
            verdict,
            result_fingerprint,
            reason,
            cast_at: now,
        };

        if request.expire_if_due(timeout_secs, now) {
            warn!(
                request = %request_id,
                window = %format_duration(timeout_secs),
                "consensus request timed out before vote"
            );
        }
        match request.state() {
            RequestState::Verified | RequestState::Failed => {
                debug!(request = %request_id, voter = %vote.voter, "vote rejected: {REJECT_FINALIZED}");
                return Ok(request.reject(vote, REJECT_FINALIZED));
            }
            RequestState::Timeout => {
                debug!(request = %request_id, voter = %vote.voter, "vote rejected: {REJECT_TIMED_OUT}");
                return Ok(request.reject(vote, REJECT_TIMED_OUT));
            }
            RequestState::Pending | RequestState::Processing | RequestState::Retrying => {}
        }

        debug!(request = %request_id, voter = %vote.voter, verdict = ?verdict, "vote recorded");
        let outcome = request.record(vote, &roster, quorum, now)?;
        if let VoteResult::Finalized(result) = &outcome {
            info!(
                request = %request_id,
                verdict = ?result.verdict,
                retries = request.retry_count(),
                "consensus request finalized: {}",
                result.reason
            );
        }
        Ok(outcome)
    }

    /// Move an open request past its deadline to Timeout.
    ///
    /// Pure observer for requests that are decided, already timed out, or
    /// still inside their window. Returns the resulting state.
    pub fn check_timeout(&self, request_id: &RequestId) -> Result<RequestState, ConsensusError> {
        let timeout_secs = self.timeout_secs();
        let shared = self.lookup(request_id)?;
        let mut request = lock_request(&shared);
        self.expire(&mut request, timeout_secs);
        Ok(request.state())
    }

    /// Reopen a Failed or timed-out request for a fresh round of votes.
    ///
    /// Returns the new retry count. `RetryLimitExceeded` is terminal: the
    /// request is left permanently Failed. `RetryTooSoon` is transient.
    pub fn retry(&self, request_id: &RequestId) -> Result<u32, ConsensusError> {
        let (max_retries, retry_delay_secs, timeout_secs) = {
            let config = self.read_config();
            (config.max_retries, config.retry_delay_secs, config.timeout_secs)
        };
        let shared = self.lookup(request_id)?;
        let mut request = lock_request(&shared);
        let now = self.clock.now();
        self.expire(&mut request, timeout_secs);

        if request.is_exhausted() {
            return Err(ConsensusError::RetryLimitExceeded { max: max_retries });
        }
        let state = request.state();
        if !matches!(state, RequestState::Failed | RequestState::Timeout) {
            return Err(ConsensusError::InvalidTransition {
                from: state,
                to: RequestState::Retrying,
            });
        }
        if request.retry_count() >= max_retries {
            request.exhaust(now)?;
            warn!(
                request = %request_id,
                retries = request.retry_count(),
                "retry limit reached; request permanently failed"
            );
            return Err(ConsensusError::RetryLimitExceeded { max: max_retries });
        }
        if let Some(last) = request.last_retry_at() {
            if !last.has_elapsed(retry_delay_secs, now) {
                let retry_after_secs =
                    retry_delay_secs.saturating_sub(last.elapsed_since(now));
                return Err(ConsensusError::RetryTooSoon { retry_after_secs });
            }
        }

        request.reopen(now)?;
        info!(
            request = %request_id,
            retry = request.retry_count(),
            max = max_retries,
            "consensus request reopened"
        );
        Ok(request.retry_count())
    }

    /// Current state, with the timeout evaluated first.
    pub fn status(&self, request_id: &RequestId) -> Result<RequestState, ConsensusError> {
        self.check_timeout(request_id)
    }

    /// A copy of the request, with the timeout evaluated first.
    pub fn get(&self, request_id: &RequestId) -> Result<VerificationRequest, ConsensusError> {
        let timeout_secs = self.timeout_secs();
        let shared = self.lookup(request_id)?;
        let mut request = lock_request(&shared);
        self.expire(&mut request, timeout_secs);
        Ok(request.clone())
    }

    /// The finalized result, if the request has been decided.
    pub fn result(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<VerificationResult>, ConsensusError> {
        Ok(self.get(request_id)?.result().cloned())
    }

    /// Number of tracked requests.
    pub fn len(&self) -> usize {
        self.read_requests().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `request_id` is still tracked. Pruned requests are not.
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.read_requests().contains_key(request_id)
    }

    /// Evaluate the timeout of every open request.
    ///
    /// Returns the ids of requests that timed out during this sweep.
    pub fn sweep_timeouts(&self) -> Vec<RequestId> {
        let timeout_secs = self.timeout_secs();
        let now = self.clock.now();
        let shared: Vec<(RequestId, SharedRequest)> = self
            .read_requests()
            .iter()
            .map(|(id, r)| (*id, Arc::clone(r)))
            .collect();

        let mut expired = Vec::new();
        for (id, request) in shared {
            if lock_request(&request).expire_if_due(timeout_secs, now) {
                expired.push(id);
            }
        }
        if !expired.is_empty() {
            warn!(count = expired.len(), "consensus requests timed out during sweep");
        }
        expired
    }

    /// Drop decided requests whose result is older than `older_than`.
    ///
    /// Returns the number of requests removed.
    pub fn prune_finalized(&self, older_than: Timestamp) -> usize {
        let mut requests = self.write_requests();
        let before = requests.len();
        requests.retain(|_, shared| {
            let request = lock_request(shared);
            match request.result() {
                Some(result) if request.state().is_decided() => result.decided_at >= older_than,
                _ => true,
            }
        });
        before - requests.len()
    }

    // ── Administration ──────────────────────────────────────────────────

    /// Add a voter to the roster. Returns `false` if already present.
    pub fn add_voter(&self, caller: &AccountId, voter: AccountId) -> Result<bool, ConsensusError> {
        if !voter.is_valid() {
            return Err(ConsensusError::Config(format!(
                "invalid voter identifier {:?}",
                voter.as_str()
            )));
        }
        let mut config = self.authorized_config(caller)?;
        info!(admin = %caller, voter = %voter, "voter added to roster");
        Ok(config.voters.insert(voter))
    }

    /// Remove a voter from the roster. Votes already cast still count.
    pub fn remove_voter(
        &self,
        caller: &AccountId,
        voter: &AccountId,
    ) -> Result<bool, ConsensusError> {
        let mut config = self.authorized_config(caller)?;
        info!(admin = %caller, voter = %voter, "voter removed from roster");
        Ok(config.voters.remove(voter))
    }

    pub fn set_quorum(&self, caller: &AccountId, quorum: u32) -> Result<(), ConsensusError> {
        if quorum == 0 {
            return Err(ConsensusError::Config("quorum must be at least 1".into()));
        }
        let mut config = self.authorized_config(caller)?;
        info!(admin = %caller, from = config.quorum, to = quorum, "quorum changed");
        config.quorum = quorum;
        Ok(())
    }

    pub fn set_timeout(&self, caller: &AccountId, timeout_secs: u64) -> Result<(), ConsensusError> {
        if timeout_secs == 0 {
            return Err(ConsensusError::Config(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        let mut config = self.authorized_config(caller)?;
        info!(
            admin = %caller,
            window = %format_duration(timeout_secs),
            "voting window changed"
        );
        config.timeout_secs = timeout_secs;
        Ok(())
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn expire(&self, request: &mut VerificationRequest, timeout_secs: u64) {
        if request.expire_if_due(timeout_secs, self.clock.now()) {
            warn!(
                request = %request.request_id(),
                window = %format_duration(timeout_secs),
                "consensus request timed out"
            );
        }
    }

    fn lookup(&self, request_id: &RequestId) -> Result<SharedRequest, ConsensusError> {
        self.read_requests()
            .get(request_id)
            .cloned()
            .ok_or_else(|| ConsensusError::RequestNotFound(request_id.to_string()))
    }

    fn authorized_config(
        &self,
        caller: &AccountId,
    ) -> Result<RwLockWriteGuard<'_, ConsensusConfig>, ConsensusError> {
        let config = self.config.write().unwrap_or_else(|e| e.into_inner());
        if &config.admin != caller {
            warn!(caller = %caller, "unauthorized consensus configuration change");
            return Err(ConsensusError::Unauthorized(caller.to_string()));
        }
        Ok(config)
    }

    fn read_config(&self) -> RwLockReadGuard<'_, ConsensusConfig> {
        self.config.read().unwrap_or_else(|e| e.into_inner())
    }

    fn read_requests(&self) -> RwLockReadGuard<'_, HashMap<RequestId, SharedRequest>> {
        self.requests.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_requests(&self) -> RwLockWriteGuard<'_, HashMap<RequestId, SharedRequest>> {
        self.requests.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Every mutation of a request completes before its guard drops, so a
/// poisoned lock still holds a consistent request.
fn lock_request(shared: &SharedRequest) -> MutexGuard<'_, VerificationRequest> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}
