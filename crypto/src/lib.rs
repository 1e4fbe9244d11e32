//! Cryptographic helpers for the Warden engine.
//!
//! - **Blake2b-256** for content fingerprints
//! - Domain-separated derivation of request and workflow identifiers

pub mod hash;

pub use hash::{
    blake2b_256, blake2b_256_multi, derive_request_id, derive_workflow_id, fingerprint_of,
};
