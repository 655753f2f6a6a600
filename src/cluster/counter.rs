//! Named cluster counters.
//!
//! Tracks small shared integers, e.g. consecutive heartbeat failures per
//! service. Reset removes the entry so absent and zero read the same.

use std::sync::Arc;

use dashmap::DashMap;

#[derive(Clone, Default)]
pub struct Counters {
    values: Arc<DashMap<String, i64>>,
}

impl Counters {
    /// Add one and return the new value.
    pub fn increment(&self, name: &str) -> i64 {
        let mut entry = self.values.entry(name.to_string()).or_insert(0);
        *entry += 1;
        *entry
    }

    pub fn get(&self, name: &str) -> i64 {
        self.values.get(name).map(|v| *v).unwrap_or(0)
    }

    pub fn reset(&self, name: &str) {
        self.values.remove(name);
    }
}
