//! Proof backend: delegates the cryptographic check to an external oracle.

use std::sync::Arc;
use warden_types::Fingerprint;

use crate::backend::{BackendKind, BackendVerdict, ProofPayload, ProofSubmission, VerificationBackend};
use crate::error::BackendError;

/// What a proof oracle reports for a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OracleOutput {
    /// Whether the proof verifies at all.
    pub valid: bool,
    /// The result the proof attests to.
    pub result_fingerprint: Fingerprint,
}

/// An external proof verifier (circuit verifier, attestation service, ...).
pub trait ProofOracle: Send + Sync {
    fn check(&self, payload: &ProofPayload) -> Result<OracleOutput, BackendError>;
}

/// Synchronous proof verification. Never returns `Pending`.
pub struct ProofBackend {
    oracle: Arc<dyn ProofOracle>,
}

impl ProofBackend {
    pub fn new(oracle: Arc<dyn ProofOracle>) -> Self {
        Self { oracle }
    }
}

impl VerificationBackend for ProofBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Proof
    }

    fn verify(
        &self,
        submission: &ProofSubmission<'_>,
        expected: &Fingerprint,
    ) -> Result<BackendVerdict, BackendError> {
        submission.ensure_bound()?;

        let output = self.oracle.check(submission.payload)?;
        if !output.valid {
            return Ok(BackendVerdict::Invalid {
                reason: "proof rejected by oracle".into(),
            });
        }
        if &output.result_fingerprint != expected {
            return Ok(BackendVerdict::result_mismatch(
                &output.result_fingerprint,
                expected,
            ));
        }
        Ok(BackendVerdict::Valid {
            result_fingerprint: output.result_fingerprint,
        })
    }
}
