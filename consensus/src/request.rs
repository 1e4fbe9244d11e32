//! Verification request state machine.
//!
//! ```text
//! Pending ──vote──▶ Processing ──quorum──▶ Verified | Failed
//!    │                  │
//!    └──────deadline────┴──────────────▶ Timeout
//!
//! Failed | Timeout ──retry()──▶ Retrying ──vote──▶ Processing
//! Timeout ──retry budget spent──▶ Failed (exhausted)
//! ```
//!
//! A request is only ever mutated through [`VerificationRequest::transition`]
//! and the other crate-private methods, which check every move against the
//! table above.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use warden_types::{AccountId, Fingerprint, RequestId, Timestamp};

use crate::error::ConsensusError;

/// Lifecycle state of a consensus verification request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Registered, no votes yet.
    Pending,
    /// At least one vote recorded, quorum not yet decided.
    Processing,
    /// Valid votes reached quorum. Terminal.
    Verified,
    /// Quorum became unreachable (or the retry budget ran out).
    Failed,
    /// The voting window elapsed while undecided.
    Timeout,
    /// Reopened for a fresh round of votes.
    Retrying,
}

impl RequestState {
    /// Still collecting votes.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Retrying)
    }

    /// Decided by quorum (or by retry exhaustion).
    pub fn is_decided(&self) -> bool {
        matches!(self, Self::Verified | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Timeout)
                | (Processing, Verified)
                | (Processing, Failed)
                | (Processing, Timeout)
                | (Retrying, Processing)
                | (Retrying, Timeout)
                | (Failed, Retrying)
                | (Timeout, Retrying)
                | (Timeout, Failed)
        )
    }
}

/// A voter's verdict on a proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Valid,
    Invalid,
}

/// A single voter's vote on a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: AccountId,
    pub request_id: RequestId,
    pub verdict: Verdict,
    /// Fingerprint of the compliance value the voter checked the proof against.
    pub result_fingerprint: Fingerprint,
    pub reason: Option<String>,
    pub cast_at: Timestamp,
}

/// A vote that arrived when the request no longer accepted votes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedVote {
    pub vote: Vote,
    pub reason: String,
}

/// The finalized outcome of a request. Never modified once created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub request_id: RequestId,
    pub verdict: Verdict,
    pub result_fingerprint: Fingerprint,
    pub decided_at: Timestamp,
    /// The voter whose vote decided the outcome; `None` when the request
    /// failed because its retry budget ran out.
    pub deciding_voter: Option<AccountId>,
    pub reason: String,
}

/// The outcome of submitting a vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoteResult {
    /// Recorded; the request is still collecting votes.
    Accepted { state: RequestState },
    /// Recorded, and this vote decided the request.
    Finalized(VerificationResult),
    /// Not counted: the request was already decided or timed out.
    Rejected { reason: String },
}

pub(crate) const REJECT_FINALIZED: &str = "request already finalized";
pub(crate) const REJECT_TIMED_OUT: &str = "request timed out";
pub(crate) const REJECT_EXHAUSTED: &str = "retry limit exceeded";

/// One consensus verification request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationRequest {
    request_id: RequestId,
    subject: AccountId,
    proof_fingerprint: Fingerprint,
    payload: Vec<u8>,
    created_at: Timestamp,
    state: RequestState,
    votes: Vec<Vote>,
    rejected_votes: Vec<RejectedVote>,
    retry_count: u32,
    last_retry_at: Option<Timestamp>,
    /// Start of the current voting window; reset on every retry.
    window_start: Timestamp,
    result: Option<VerificationResult>,
    exhausted: bool,
}

impl VerificationRequest {
    pub(crate) fn new(
        request_id: RequestId,
        subject: AccountId,
        proof_fingerprint: Fingerprint,
        payload: Vec<u8>,
        now: Timestamp,
    ) -> Self {
        Self {
            request_id,
            subject,
            proof_fingerprint,
            payload,
            created_at: now,
            state: RequestState::Pending,
            votes: Vec::new(),
            rejected_votes: Vec::new(),
            retry_count: 0,
            last_retry_at: None,
            window_start: now,
            result: None,
            exhausted: false,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub fn subject(&self) -> &AccountId {
        &self.subject
    }

    pub fn proof_fingerprint(&self) -> Fingerprint {
        self.proof_fingerprint
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Votes of the current round.
    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    pub fn rejected_votes(&self) -> &[RejectedVote] {
        &self.rejected_votes
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_retry_at(&self) -> Option<Timestamp> {
        self.last_retry_at
    }

    pub fn window_start(&self) -> Timestamp {
        self.window_start
    }

    pub fn result(&self) -> Option<&VerificationResult> {
        self.result.as_ref()
    }

    /// The retry budget is spent; the request stays Failed forever.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn has_voted(&self, voter: &AccountId) -> bool {
        self.votes.iter().any(|v| &v.voter == voter)
    }

    /// Move along one edge of the state machine.
    pub(crate) fn transition(&mut self, next: RequestState) -> Result<(), ConsensusError> {
        if !self.state.can_transition_to(next) {
            return Err(ConsensusError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Transition to Timeout if the window has elapsed while still open.
    ///
    /// Returns `true` if this call caused the transition.
    pub(crate) fn expire_if_due(&mut self, timeout_secs: u64, now: Timestamp) -> bool {
        if self.state.is_open() && self.window_start.is_past_deadline(timeout_secs, now) {
            self.state = RequestState::Timeout;
            return true;
        }
        false
    }

    pub(crate) fn reject(&mut self, vote: Vote, reason: &str) -> VoteResult {
        self.rejected_votes.push(RejectedVote {
            vote,
            reason: reason.to_string(),
        });
        VoteResult::Rejected {
            reason: reason.to_string(),
        }
    }

    /// Append a vote and re-evaluate quorum against the current roster.
    ///
    /// Valid votes are tallied per result fingerprint. The request verifies
    /// once one fingerprint has `quorum` valid votes, and fails once the best
    /// tally plus the roster members yet to vote can no longer reach `quorum`.
    pub(crate) fn record(
        &mut self,
        vote: Vote,
        roster: &BTreeSet<AccountId>,
        quorum: u32,
        now: Timestamp,
    ) -> Result<VoteResult, ConsensusError> {
        if matches!(self.state, RequestState::Pending | RequestState::Retrying) {
            self.transition(RequestState::Processing)?;
        }

        let deciding_voter = vote.voter.clone();
        let deciding_fingerprint = vote.result_fingerprint;
        self.votes.push(vote);

        let (best_fingerprint, best_tally) = match self.leading_valid() {
            Some((fp, tally)) => (fp, tally),
            None => (deciding_fingerprint, 0),
        };
        let outstanding = roster.iter().filter(|v| !self.has_voted(v)).count() as u32;
        let quorum = quorum.max(1);

        if best_tally >= quorum {
            self.transition(RequestState::Verified)?;
            let result = VerificationResult {
                request_id: self.request_id,
                verdict: Verdict::Valid,
                result_fingerprint: best_fingerprint,
                decided_at: now,
                deciding_voter: Some(deciding_voter),
                reason: format!("{best_tally} valid votes reached quorum {quorum}"),
            };
            self.result = Some(result.clone());
            return Ok(VoteResult::Finalized(result));
        }

        if best_tally.saturating_add(outstanding) < quorum {
            self.transition(RequestState::Failed)?;
            let result = VerificationResult {
                request_id: self.request_id,
                verdict: Verdict::Invalid,
                result_fingerprint: deciding_fingerprint,
                decided_at: now,
                deciding_voter: Some(deciding_voter),
                reason: format!(
                    "quorum {quorum} unreachable: best valid tally {best_tally} with {outstanding} votes outstanding"
                ),
            };
            self.result = Some(result.clone());
            return Ok(VoteResult::Finalized(result));
        }

        Ok(VoteResult::Accepted { state: self.state })
    }

    /// Reopen a Failed/Timeout request for a fresh round of votes.
    pub(crate) fn reopen(&mut self, now: Timestamp) -> Result<(), ConsensusError> {
        self.transition(RequestState::Retrying)?;
        self.votes.clear();
        self.result = None;
        self.retry_count += 1;
        self.last_retry_at = Some(now);
        self.window_start = now;
        Ok(())
    }

    /// Mark the request permanently failed after its retry budget ran out.
    pub(crate) fn exhaust(&mut self, now: Timestamp) -> Result<(), ConsensusError> {
        if self.state == RequestState::Timeout {
            self.transition(RequestState::Failed)?;
            self.result = Some(VerificationResult {
                request_id: self.request_id,
                verdict: Verdict::Invalid,
                result_fingerprint: Fingerprint::ZERO,
                decided_at: now,
                deciding_voter: None,
                reason: REJECT_EXHAUSTED.to_string(),
            });
        }
        self.exhausted = true;
        Ok(())
    }

    /// The result fingerprint with the most valid votes, if any.
    fn leading_valid(&self) -> Option<(Fingerprint, u32)> {
        let mut tally: HashMap<Fingerprint, u32> = HashMap::new();
        for vote in self.votes.iter().filter(|v| v.verdict == Verdict::Valid) {
            *tally.entry(vote.result_fingerprint).or_insert(0) += 1;
        }
        tally
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
    }
}
