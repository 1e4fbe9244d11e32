//! Consensus verification: multi-voter quorum checks for submitted proofs.
//!
//! Independent off-chain voters each check a proof and vote Valid or Invalid
//! together with the result fingerprint they checked it against. A request is
//! verified once one result fingerprint collects `quorum` valid votes, and
//! failed once that can no longer happen.
//!
//! ## Module overview
//!
//! - [`request`]: Request state machine (Pending → Processing → Verified/Failed, Timeout, Retrying).
//! - [`coordinator`]: Container owning all requests: votes, quorum, timeouts, bounded retries, roster admin.
//! - [`config`]: Roster and thresholds, loadable from TOML.
//! - [`inbox`]: Message-passing vote delivery.
//! - [`sweeper`]: Periodic timeout sweep.
//! - [`error`]: Consensus error types.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod inbox;
pub mod request;
pub mod sweeper;

pub use config::ConsensusConfig;
pub use coordinator::ConsensusCoordinator;
pub use error::ConsensusError;
pub use inbox::{spawn_vote_inbox, VoteInbox, VoteMessage};
pub use request::{
    RejectedVote, RequestState, Verdict, VerificationRequest, VerificationResult, Vote, VoteResult,
};
pub use sweeper::{default_sweep_interval, spawn_timeout_sweeper};
