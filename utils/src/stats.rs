//! Named event counters.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// A fixed set of named counters, safe to bump from any thread.
///
/// Names are declared up front. Writes to an undeclared name are dropped and
/// reads of one return zero.
pub struct StatsCounter {
    counters: Vec<(&'static str, AtomicU64)>,
}

impl StatsCounter {
    pub fn new(names: &[&'static str]) -> Self {
        let mut counters: Vec<(&'static str, AtomicU64)> = Vec::with_capacity(names.len());
        for &name in names {
            if !counters.iter().any(|(n, _)| *n == name) {
                counters.push((name, AtomicU64::new(0)));
            }
        }
        Self { counters }
    }

    fn slot(&self, name: &str) -> Option<&AtomicU64> {
        self.counters
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    pub fn increment(&self, name: &str) {
        self.add(name, 1);
    }

    pub fn add(&self, name: &str, value: u64) {
        if let Some(counter) = self.slot(name) {
            counter.fetch_add(value, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.slot(name)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Point-in-time values, keyed by name.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        self.counters
            .iter()
            .map(|(name, c)| (*name, c.load(Ordering::Relaxed)))
            .collect()
    }

    /// Emit every counter as one `info` event under `scope`.
    pub fn log_summary(&self, scope: &str) {
        let summary = self
            .counters
            .iter()
            .map(|(name, c)| format!("{name}={}", c.load(Ordering::Relaxed)))
            .collect::<Vec<_>>()
            .join(" ");
        tracing::info!(scope, "{summary}");
    }
}
