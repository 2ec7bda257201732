use serde::{Deserialize, Serialize};

use super::now_ms;

/// Access and store counters attached to a stored value.
///
/// Updated synchronously with the record it belongs to and guarded by whatever
/// lock already guards that record. Consumed by eviction and cost accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStatistics {
    access_count: u64,
    last_access_time: u64,
    store_count: u64,
    last_store_time: u64,
}

impl RecordStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access(&mut self) {
        self.access_count += 1;
        self.last_access_time = now_ms().max(self.last_access_time);
    }

    pub fn store(&mut self) {
        self.store_count += 1;
        self.last_store_time = now_ms().max(self.last_store_time);
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub fn last_access_time(&self) -> u64 {
        self.last_access_time
    }

    pub fn store_count(&self) -> u64 {
        self.store_count
    }

    pub fn last_store_time(&self) -> u64 {
        self.last_store_time
    }

    pub fn memory_cost(&self) -> u64 {
        std::mem::size_of::<Self>() as u64
    }
}
