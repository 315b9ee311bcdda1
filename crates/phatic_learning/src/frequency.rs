//! Visit counts per (key, state) pair.
//!
//! Counts drive both the optimistic exploration rule and the 1/(n+1)
//! learning-rate schedule.

use std::collections::BTreeMap;

/// (key, state) → visit count. Absent pairs read as zero and are never
/// created by a read.
#[derive(Debug, Clone)]
pub struct VisitFrequencyTable<K> {
    counts: BTreeMap<K, BTreeMap<String, u64>>,
}

impl<K: Ord + Clone> VisitFrequencyTable<K> {
    pub fn new() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }

    pub fn increment(&mut self, key: &K, state: &str) {
        let count = self
            .counts
            .entry(key.clone())
            .or_default()
            .entry(state.to_string())
            .or_insert(0);
        *count += 1;
    }

    pub fn get(&self, key: &K, state: &str) -> u64 {
        self.counts
            .get(key)
            .and_then(|states| states.get(state))
            .copied()
            .unwrap_or(0)
    }

    pub fn set(&mut self, key: &K, state: &str, count: u64) {
        self.counts
            .entry(key.clone())
            .or_default()
            .insert(state.to_string(), count);
    }

    /// Zero every stored count; the entries themselves stay.
    pub fn reset(&mut self) {
        for count in self.counts.values_mut().flat_map(|s| s.values_mut()) {
            *count = 0;
        }
    }

    /// Multiply every count by `factor`, truncating toward zero.
    ///
    /// Truncation happens on every call, so two scalings by 0.65 are not the
    /// same as one scaling by 0.4225.
    pub fn scale(&mut self, factor: f64) {
        for count in self.counts.values_mut().flat_map(|s| s.values_mut()) {
            *count = (*count as f64 * factor) as u64;
        }
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.counts.len()
    }

    /// Number of distinct (key, state) pairs.
    pub fn pair_count(&self) -> usize {
        self.counts.values().map(BTreeMap::len).sum()
    }

    pub fn total_visits(&self) -> u64 {
        self.counts.values().flat_map(|s| s.values()).sum()
    }

    pub fn states(&self, key: &K) -> Option<&BTreeMap<String, u64>> {
        self.counts.get(key)
    }

    /// Keys in ascending order with their per-state counts.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &BTreeMap<String, u64>)> {
        self.counts.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<K: Ord + Clone> Default for VisitFrequencyTable<K> {
    fn default() -> Self {
        Self::new()
    }
}
