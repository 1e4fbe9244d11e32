//! Per-subject cache of the fingerprint each subject was last accepted under.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use warden_types::{AccountId, Fingerprint, Timestamp};

use crate::error::VerificationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRecord {
    pub subject: AccountId,
    pub accepted_fingerprint: Fingerprint,
    pub accepted_at: Timestamp,
}

/// Subjects recently accepted, keyed by subject.
///
/// A hit only counts while the stored fingerprint equals the current
/// expected one, so changing the expected fingerprint invalidates every
/// entry without touching the map.
#[derive(Debug, Default)]
pub struct ComplianceCache {
    records: RwLock<HashMap<AccountId, ComplianceRecord>>,
}

impl ComplianceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, subject: &AccountId) -> Option<ComplianceRecord> {
        self.read().get(subject).cloned()
    }

    /// Whether `subject` was accepted under `expected`.
    pub fn is_compliant(&self, subject: &AccountId, expected: &Fingerprint) -> bool {
        self.read()
            .get(subject)
            .is_some_and(|r| &r.accepted_fingerprint == expected)
    }

    /// Record an acceptance, returning the record it replaced.
    pub fn set(
        &self,
        subject: AccountId,
        accepted_fingerprint: Fingerprint,
        accepted_at: Timestamp,
    ) -> Option<ComplianceRecord> {
        let record = ComplianceRecord {
            subject: subject.clone(),
            accepted_fingerprint,
            accepted_at,
        };
        self.write().insert(subject, record)
    }

    pub fn invalidate(&self, subject: &AccountId) -> Option<ComplianceRecord> {
        self.write().remove(subject)
    }

    pub fn contains(&self, subject: &AccountId) -> bool {
        self.read().contains_key(subject)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// All records, ordered by subject.
    pub fn snapshot(&self) -> Vec<ComplianceRecord> {
        let mut records: Vec<_> = self.read().values().cloned().collect();
        records.sort_by(|a, b| a.subject.cmp(&b.subject));
        records
    }

    pub fn restore(records: Vec<ComplianceRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| (r.subject.clone(), r))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, VerificationError> {
        bincode::serialize(&self.snapshot()).map_err(|e| VerificationError::Snapshot(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VerificationError> {
        let records: Vec<ComplianceRecord> =
            bincode::deserialize(bytes).map_err(|e| VerificationError::Snapshot(e.to_string()))?;
        Ok(Self::restore(records))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<AccountId, ComplianceRecord>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<AccountId, ComplianceRecord>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }
}
