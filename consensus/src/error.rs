use crate::request::RequestState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("verification request {0} not found")]
    RequestNotFound(String),

    #[error("voter {voter} has already voted on request {request}")]
    DuplicateVoter { voter: String, request: String },

    #[error("voter {0} is not on the voter roster")]
    UnknownVoter(String),

    #[error("maximum retries ({max}) exceeded; request is permanently failed")]
    RetryLimitExceeded { max: u32 },

    #[error("retry attempted too soon; retry allowed in {retry_after_secs}s")]
    RetryTooSoon { retry_after_secs: u64 },

    #[error("illegal transition {from:?} -> {to:?}")]
    InvalidTransition { from: RequestState, to: RequestState },

    #[error("unauthorized: {0} is not the consensus administrator")]
    Unauthorized(String),

    #[error("invalid consensus configuration: {0}")]
    Config(String),

    #[error("vote inbox is closed")]
    InboxClosed,

    #[error("no reply from vote inbox within {secs}s")]
    ReplyTimeout { secs: u64 },
}

impl ConsensusError {
    /// The request can never be decided again; callers treat it as permanently failed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RetryLimitExceeded { .. })
    }

    /// The same call may succeed later without any other change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RetryTooSoon { .. } | Self::ReplyTimeout { .. }
        )
    }
}

impl From<ConsensusError> for warden_types::WardenError {
    fn from(e: ConsensusError) -> Self {
        match e {
            ConsensusError::Unauthorized(who) => Self::Unauthorized(who),
            ConsensusError::Config(msg) => Self::Config(msg),
            other => Self::Consensus(other.to_string()),
        }
    }
}
