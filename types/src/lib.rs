//! Fundamental types for the Warden compliance engine.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! account identifiers, fingerprints, request/workflow ids, timestamps and the clock seam.

pub mod account;
pub mod error;
pub mod fingerprint;
pub mod time;

pub use account::AccountId;
pub use error::WardenError;
pub use fingerprint::{Fingerprint, RequestId, WorkflowId};
pub use time::{Clock, SystemClock, Timestamp};
