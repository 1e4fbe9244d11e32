use thiserror::Error;
use warden_consensus::ConsensusError;
use warden_types::WardenError;

use crate::backend::BackendKind;

/// Errors raised while building or administering the orchestrator.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("backend chain is empty")]
    EmptyChain,

    #[error("fallback chain must name 2 or 3 backends, got {0}")]
    InvalidChainLength(usize),

    #[error("backend {0} appears more than once in the chain")]
    DuplicateBackend(BackendKind),

    #[error("backend {0} is named by the mode but was never registered")]
    MissingBackend(BackendKind),

    #[error("unauthorized: {0} is not the configured administrator")]
    Unauthorized(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

/// Errors a backend may raise instead of returning a verdict.
///
/// Identity and reuse errors end the whole workflow. Everything else only
/// fails the backend that raised it, so a fallback chain moves on.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("proof is bound to {bound}, not to {subject}")]
    IdentityMismatch { subject: String, bound: String },

    #[error("proof already used: {0}")]
    AlreadyUsed(String),

    #[error("proof oracle error: {0}")]
    Oracle(String),

    #[error("compute service error: {0}")]
    Service(String),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Whether this error must stop the workflow rather than fall through.
    pub fn aborts_workflow(&self) -> bool {
        matches!(
            self,
            BackendError::IdentityMismatch { .. } | BackendError::AlreadyUsed(_)
        )
    }
}

impl From<VerificationError> for WardenError {
    fn from(e: VerificationError) -> Self {
        match e {
            VerificationError::Unauthorized(who) => WardenError::Unauthorized(who),
            VerificationError::InvalidFingerprint(s) => WardenError::InvalidFingerprint(s),
            VerificationError::Config(s) => WardenError::Config(s),
            VerificationError::Snapshot(s) => WardenError::Serialization(s),
            other => WardenError::Verification(other.to_string()),
        }
    }
}
