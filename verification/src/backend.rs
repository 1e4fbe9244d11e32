//! The pluggable verification backend seam.
//!
//! The orchestrator does not care HOW a proof is checked, only whether the
//! backend vouches for it against the expected compliance fingerprint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use warden_types::{AccountId, Fingerprint, RequestId};

use crate::error::BackendError;

/// The three verification methods a chain can be built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Cryptographic proof checked by an oracle.
    Proof,
    /// Quorum vote among off-chain voters.
    Consensus,
    /// Asynchronous job on an external compute service.
    Compute,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Proof => "proof",
            BackendKind::Consensus => "consensus",
            BackendKind::Compute => "compute",
        })
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "proof" => Ok(BackendKind::Proof),
            "consensus" => Ok(BackendKind::Consensus),
            "compute" => Ok(BackendKind::Compute),
            other => Err(format!("unknown backend: {other}")),
        }
    }
}

/// Opaque proof material supplied by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofPayload {
    /// The subject the proof was generated for.
    pub bound_subject: AccountId,
    /// Raw proof bytes. The caller's proof fingerprint is their hash.
    pub proof: Vec<u8>,
    /// Public inputs the proof commits to.
    pub public_inputs: Vec<u8>,
}

impl ProofPayload {
    pub fn new(bound_subject: AccountId, proof: Vec<u8>, public_inputs: Vec<u8>) -> Self {
        Self {
            bound_subject,
            proof,
            public_inputs,
        }
    }
}

/// Everything a backend is handed for one attempt.
#[derive(Clone, Copy, Debug)]
pub struct ProofSubmission<'a> {
    pub subject: &'a AccountId,
    pub proof_fingerprint: Fingerprint,
    pub payload: &'a ProofPayload,
}

impl ProofSubmission<'_> {
    /// Reject proofs generated for a different subject.
    pub fn ensure_bound(&self) -> Result<(), BackendError> {
        if &self.payload.bound_subject != self.subject {
            return Err(BackendError::IdentityMismatch {
                subject: self.subject.to_string(),
                bound: self.payload.bound_subject.to_string(),
            });
        }
        Ok(())
    }
}

/// A backend's answer for one attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendVerdict {
    /// The proof holds and its result matches the expected fingerprint.
    Valid { result_fingerprint: Fingerprint },
    /// The proof does not hold, or holds for the wrong result.
    Invalid { reason: String },
    /// No answer yet; re-invoke once `request_id` has progressed.
    Pending { request_id: RequestId },
}

impl BackendVerdict {
    pub(crate) fn result_mismatch(found: &Fingerprint, expected: &Fingerprint) -> Self {
        BackendVerdict::Invalid {
            reason: format!("result fingerprint {found} does not match expected {expected}"),
        }
    }
}

/// A verification method the orchestrator can route a proof to.
pub trait VerificationBackend: Send + Sync {
    /// Which method this backend implements. One backend per kind.
    fn kind(&self) -> BackendKind;

    /// Check `submission` against the `expected` compliance fingerprint.
    fn verify(
        &self,
        submission: &ProofSubmission<'_>,
        expected: &Fingerprint,
    ) -> Result<BackendVerdict, BackendError>;
}
