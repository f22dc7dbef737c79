//! Bounded verdict cache keyed by canonical image fingerprint.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tagsmith_placement::ManufacturabilityVerdict;

/// Keeps the most recently used verdicts, evicting the oldest once
/// `capacity` is reached. A capacity of zero caches nothing.
#[derive(Debug, Default)]
pub struct VerdictCache {
    capacity: usize,
    entries: HashMap<u64, Arc<ManufacturabilityVerdict>>,
    /// Fingerprints from least to most recently used.
    order: VecDeque<u64>,
}

impl VerdictCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a verdict without marking it used.
    #[must_use]
    pub fn peek(&self, fingerprint: u64) -> Option<&Arc<ManufacturabilityVerdict>> {
        self.entries.get(&fingerprint)
    }

    /// Look up a verdict and mark it most recently used.
    pub fn get(&mut self, fingerprint: u64) -> Option<Arc<ManufacturabilityVerdict>> {
        let verdict = self.entries.get(&fingerprint).cloned()?;
        self.touch(fingerprint);
        Some(verdict)
    }

    pub fn insert(&mut self, fingerprint: u64, verdict: Arc<ManufacturabilityVerdict>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(fingerprint, verdict).is_some() {
            self.touch(fingerprint);
            return;
        }
        self.order.push_back(fingerprint);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                log::debug!("session: evicted cached verdict {oldest:016x}");
            }
        }
    }

    fn touch(&mut self, fingerprint: u64) {
        if let Some(pos) = self.order.iter().position(|&f| f == fingerprint) {
            self.order.remove(pos);
        }
        self.order.push_back(fingerprint);
    }
}
