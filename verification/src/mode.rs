//! Verification modes: one backend, or an ordered fallback chain.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::backend::BackendKind;
use crate::error::VerificationError;

/// Longest chain a fallback mode may name.
pub const MAX_CHAIN_LEN: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    Single(BackendKind),
    Fallback(Vec<BackendKind>),
}

impl VerificationMode {
    pub fn single(kind: BackendKind) -> Self {
        VerificationMode::Single(kind)
    }

    /// An ordered chain of 2 or 3 distinct backends.
    pub fn fallback(chain: Vec<BackendKind>) -> Result<Self, VerificationError> {
        let mode = VerificationMode::Fallback(chain);
        mode.validate()?;
        Ok(mode)
    }

    pub fn validate(&self) -> Result<(), VerificationError> {
        let chain = match self {
            VerificationMode::Single(_) => return Ok(()),
            VerificationMode::Fallback(chain) => chain,
        };
        if chain.is_empty() {
            return Err(VerificationError::EmptyChain);
        }
        if chain.len() < 2 || chain.len() > MAX_CHAIN_LEN {
            return Err(VerificationError::InvalidChainLength(chain.len()));
        }
        let mut seen = HashSet::new();
        for kind in chain {
            if !seen.insert(*kind) {
                return Err(VerificationError::DuplicateBackend(*kind));
            }
        }
        Ok(())
    }

    /// Backends in the order they are tried.
    pub fn chain(&self) -> &[BackendKind] {
        match self {
            VerificationMode::Single(kind) => std::slice::from_ref(kind),
            VerificationMode::Fallback(chain) => chain,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, VerificationMode::Fallback(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BackendKind::*;

    #[test]
    fn single_chain() {
        let mode = VerificationMode::single(Consensus);
        assert_eq!(mode.chain(), &[Consensus]);
        assert!(!mode.is_fallback());
        assert!(mode.validate().is_ok());
    }

    #[test]
    fn fallback_keeps_order() {
        let mode = VerificationMode::fallback(vec![Compute, Proof, Consensus]).unwrap();
        assert_eq!(mode.chain(), &[Compute, Proof, Consensus]);
        assert!(mode.is_fallback());
    }

    #[test]
    fn fallback_rejects_bad_chains() {
        assert!(matches!(
            VerificationMode::fallback(vec![]),
            Err(VerificationError::EmptyChain)
        ));
        assert!(matches!(
            VerificationMode::fallback(vec![Proof]),
            Err(VerificationError::InvalidChainLength(1))
        ));
        assert!(matches!(
            VerificationMode::fallback(vec![Proof, Compute, Proof]),
            Err(VerificationError::DuplicateBackend(Proof))
        ));
        assert!(matches!(
            VerificationMode::Fallback(vec![Proof, Compute, Consensus, Proof]).validate(),
            Err(VerificationError::InvalidChainLength(4))
        ));
    }
}
