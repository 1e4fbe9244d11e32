//! Replay guard: each proof fingerprint may be consumed exactly once.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use warden_types::Fingerprint;

use crate::error::VerificationError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("proof {0} already used")]
pub struct AlreadyUsed(pub Fingerprint);

/// The set of consumed proof fingerprints. Grows monotonically.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    used: Mutex<HashSet<Fingerprint>>,
}

/// Serializable form of a [`ReplayGuard`], sorted for stable output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySnapshot {
    pub used: Vec<Fingerprint>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.lock().contains(fingerprint)
    }

    /// Atomically test and consume `fingerprint`.
    ///
    /// Of any number of concurrent callers with the same fingerprint, exactly
    /// one gets `Ok`.
    pub fn mark_used(&self, fingerprint: Fingerprint) -> Result<(), AlreadyUsed> {
        if self.lock().insert(fingerprint) {
            Ok(())
        } else {
            Err(AlreadyUsed(fingerprint))
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> ReplaySnapshot {
        let mut used: Vec<_> = self.lock().iter().copied().collect();
        used.sort();
        ReplaySnapshot { used }
    }

    pub fn restore(snapshot: ReplaySnapshot) -> Self {
        Self {
            used: Mutex::new(snapshot.used.into_iter().collect()),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VerificationError> {
        bincode::serialize(&self.snapshot()).map_err(|e| VerificationError::Snapshot(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VerificationError> {
        let snapshot: ReplaySnapshot =
            bincode::deserialize(bytes).map_err(|e| VerificationError::Snapshot(e.to_string()))?;
        Ok(Self::restore(snapshot))
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Fingerprint>> {
        self.used.lock().unwrap_or_else(|e| e.into_inner())
    }
}
