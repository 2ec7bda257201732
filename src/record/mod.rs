//! Records and Record Statistics
//!
//! A `CacheRecord` is one stored entry. Every read through the owner calls
//! `on_access`, every write calls `on_store`; the attached `RecordStatistics`
//! and `cost()` feed an external eviction policy, which is not part of this crate.

pub mod stats;

pub use stats::RecordStatistics;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed per-record overhead (key/value handles, version, timestamps).
pub const RECORD_OVERHEAD: u64 = 48;
/// Cost of the reference from a record to its statistics.
pub const STATISTICS_REFERENCE_COST: u64 = 4;

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    key: String,
    value: Value,
    version: u64,
    creation_time: u64,
    statistics: RecordStatistics,
}

impl CacheRecord {
    pub fn new(key: String, value: Value) -> Self {
        Self {
            key,
            value,
            version: 0,
            creation_time: now_ms(),
            statistics: RecordStatistics::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    /// Replaces the value and returns the previous one.
    pub fn set_value(&mut self, value: Value) -> Value {
        self.on_update();
        std::mem::replace(&mut self.value, value)
    }

    pub fn on_access(&mut self) {
        self.statistics.access();
    }

    pub fn on_store(&mut self) {
        self.statistics.store();
    }

    pub fn on_update(&mut self) {
        self.version += 1;
    }

    pub fn statistics(&self) -> &RecordStatistics {
        &self.statistics
    }

    pub fn set_statistics(&mut self, statistics: RecordStatistics) {
        self.statistics = statistics;
    }

    pub fn cost(&self) -> u64 {
        let value_len = serde_json::to_vec(&self.value)
            .map(|bytes| bytes.len())
            .unwrap_or(0);
        RECORD_OVERHEAD
            + self.key.len() as u64
            + value_len as u64
            + STATISTICS_REFERENCE_COST
            + self.statistics.memory_cost()
    }
}
