//! Account identifiers for subjects, voters and administrators.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WardenError;

/// An opaque principal identifier.
///
/// The same type names the subject attempting a guarded action, an off-chain
/// voter, and the administrator allowed to change engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Longest identifier accepted by [`AccountId::parse`].
    pub const MAX_LEN: usize = 128;

    /// Wrap a raw string without validation.
    ///
    /// Use [`AccountId::parse`] for untrusted input.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parse and validate an identifier from untrusted input.
    pub fn parse(raw: &str) -> Result<Self, WardenError> {
        let id = Self(raw.to_string());
        if id.is_valid() {
            Ok(id)
        } else {
            Err(WardenError::InvalidAccount(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty, bounded, and free of whitespace and control characters.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= Self::MAX_LEN
            && !self.0.chars().any(|c| c.is_whitespace() || c.is_control())
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
