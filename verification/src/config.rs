//! Orchestrator configuration with TOML file support.

use serde::{Deserialize, Serialize};
use warden_consensus::ConsensusConfig;
use warden_types::{AccountId, Fingerprint};
use warden_utils::LogFormat;

use crate::backend::BackendKind;
use crate::error::VerificationError;
use crate::mode::VerificationMode;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    #[default]
    Single,
    Fallback,
}

/// The `[mode]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeConfig {
    #[serde(default)]
    pub kind: ModeKind,

    /// Backend(s) in the order they are tried. Single mode names exactly one.
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendKind>,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            kind: ModeKind::default(),
            backends: default_backends(),
        }
    }
}

impl ModeConfig {
    pub fn to_mode(&self) -> Result<VerificationMode, VerificationError> {
        match self.kind {
            ModeKind::Single => match self.backends.as_slice() {
                [] => Err(VerificationError::EmptyChain),
                [kind] => Ok(VerificationMode::single(*kind)),
                more => Err(VerificationError::Config(format!(
                    "single mode names exactly one backend, got {}",
                    more.len()
                ))),
            },
            ModeKind::Fallback => VerificationMode::fallback(self.backends.clone()),
        }
    }
}

/// Top-level orchestrator configuration.
///
/// Scalars come first so the TOML serializer emits them ahead of the tables.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// The only principal allowed to change the expected fingerprint.
    #[serde(default = "default_admin")]
    pub admin: AccountId,

    /// When false only the first backend of a fallback chain is consulted.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,

    /// Hex-encoded compliance fingerprint proofs must attest to. Unset means
    /// nothing is accepted until an administrator sets one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_fingerprint: Option<String>,

    /// Number of finished workflows kept for inspection.
    #[serde(default = "default_audit_capacity")]
    pub audit_capacity: usize,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub mode: ModeConfig,

    /// Parameters for the consensus backend, when one is registered.
    #[serde(default)]
    pub consensus: ConsensusConfig,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_admin() -> AccountId {
    AccountId::new("admin")
}

fn default_true() -> bool {
    true
}

fn default_audit_capacity() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_backends() -> Vec<BackendKind> {
    vec![BackendKind::Proof]
}

// ── Impl ───────────────────────────────────────────────────────────────

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            admin: default_admin(),
            fallback_enabled: default_true(),
            expected_fingerprint: None,
            audit_capacity: default_audit_capacity(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            mode: ModeConfig::default(),
            consensus: ConsensusConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, VerificationError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| VerificationError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string and validate it.
    pub fn from_toml_str(s: &str) -> Result<Self, VerificationError> {
        let config: Self =
            toml::from_str(s).map_err(|e| VerificationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, VerificationError> {
        toml::to_string_pretty(self).map_err(|e| VerificationError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), VerificationError> {
        if !self.admin.is_valid() {
            return Err(VerificationError::Config(format!(
                "invalid admin identifier {:?}",
                self.admin.as_str()
            )));
        }
        self.mode.to_mode()?;
        self.expected()?;
        if self.mode.backends.contains(&BackendKind::Consensus) {
            self.consensus.validate()?;
        }
        Ok(())
    }

    /// The configured expected fingerprint, or zero when unset.
    pub fn expected(&self) -> Result<Fingerprint, VerificationError> {
        match &self.expected_fingerprint {
            None => Ok(Fingerprint::ZERO),
            Some(hex) => Fingerprint::from_hex(hex)
                .map_err(|e| VerificationError::InvalidFingerprint(e.to_string())),
        }
    }

    /// Install the global tracing subscriber described by this config.
    pub fn init_logging(&self) -> bool {
        warden_utils::init_logging(self.log_format, &self.log_level)
    }
}
