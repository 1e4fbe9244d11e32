//! Top-level error type shared across crates.

use thiserror::Error;

/// Common error type for the Warden engine.
#[derive(Debug, Error)]
pub enum WardenError {
    #[error("invalid account identifier: {0:?}")]
    InvalidAccount(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("unauthorized: {0} is not the configured administrator")]
    Unauthorized(String),

    #[error("consensus error: {0}")]
    Consensus(String),

    #[error("verification error: {0}")]
    Verification(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
