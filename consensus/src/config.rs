//! Consensus configuration with TOML file support.
//!
//! The roster and thresholds are fixed at construction and afterwards change
//! only through the coordinator's admin-guarded methods.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use warden_types::AccountId;

use crate::ConsensusError;

/// Parameters of the multi-voter consensus backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// The only principal allowed to change the roster or thresholds.
    #[serde(default = "default_admin")]
    pub admin: AccountId,

    /// Voters allowed to submit votes.
    #[serde(default)]
    pub voters: BTreeSet<AccountId>,

    /// Number of matching valid votes required to verify a request.
    #[serde(default = "default_quorum")]
    pub quorum: u32,

    /// Seconds a request may stay undecided before it times out.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of retries allowed per request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Minimum seconds between two retries of the same request.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_admin() -> AccountId {
    AccountId::new("admin")
}

fn default_quorum() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    60
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ConsensusConfig {
    /// Configuration with the given roster and quorum; other values default.
    pub fn with_voters(
        admin: AccountId,
        voters: impl IntoIterator<Item = AccountId>,
        quorum: u32,
    ) -> Self {
        Self {
            admin,
            voters: voters.into_iter().collect(),
            quorum,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ConsensusError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConsensusError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, ConsensusError> {
        let config: Self = toml::from_str(s).map_err(|e| ConsensusError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConsensusError> {
        toml::to_string_pretty(self).map_err(|e| ConsensusError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConsensusError> {
        if !self.admin.is_valid() {
            return Err(ConsensusError::Config(format!(
                "invalid admin identifier {:?}",
                self.admin.as_str()
            )));
        }
        if let Some(bad) = self.voters.iter().find(|v| !v.is_valid()) {
            return Err(ConsensusError::Config(format!(
                "invalid voter identifier {:?}",
                bad.as_str()
            )));
        }
        if self.quorum == 0 {
            return Err(ConsensusError::Config("quorum must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ConsensusError::Config(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            admin: default_admin(),
            voters: BTreeSet::new(),
            quorum: default_quorum(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}
