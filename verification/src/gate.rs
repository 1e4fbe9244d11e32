//! The guarded-action seam callers integrate against.

use serde::{Deserialize, Serialize};
use warden_types::{AccountId, Fingerprint, RequestId};

use crate::backend::ProofPayload;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// The caller's input was malformed.
    InvalidInput(String),
    /// The proof fingerprint has already been consumed.
    ProofAlreadyUsed,
    /// The proof belongs to a different subject.
    IdentityMismatch(String),
    /// Every backend that could be consulted said no.
    VerificationFailed(String),
}

/// What the caller may do with the guarded action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateDecision {
    Accept,
    Reject(RejectReason),
    /// Not decided yet. Re-evaluate once `request_id` has progressed.
    Pending(RequestId),
}

impl GateDecision {
    /// Whether the guarded action may proceed now.
    pub fn permits_action(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, GateDecision::Pending(_))
    }
}

/// Anything that can decide whether a subject may perform the guarded action.
pub trait ActionGate: Send + Sync {
    fn decide(
        &self,
        subject: &AccountId,
        proof_fingerprint: &Fingerprint,
        payload: &ProofPayload,
    ) -> GateDecision;
}
