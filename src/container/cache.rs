use crate::error::{GridError, GridResult};
use crate::record::{CacheRecord, RecordStatistics};

use serde_json::Value;
use std::collections::HashMap;

/// Source of values for bulk loads. Runs on the owner's partition thread.
///
/// A loader signals an out-of-memory class condition by returning a
/// `GridError::FatalResourceExhaustion`; any other error is a domain failure.
pub trait CacheLoader: Send + Sync {
    fn load(&self, cache: &str, key: &str) -> anyhow::Result<Option<Value>>;
}

/// Key/value records of one cache in one partition.
pub struct CacheContainer {
    name: String,
    records: HashMap<String, CacheRecord>,
}

impl CacheContainer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: HashMap::new(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<Value> {
        let record = self.records.get_mut(key)?;
        record.on_access();
        Some(record.value().clone())
    }

    pub fn put(&mut self, key: String, value: Value) -> Option<Value> {
        match self.records.get_mut(&key) {
            Some(record) => {
                let previous = record.set_value(value);
                record.on_store();
                Some(previous)
            }
            None => {
                let mut record = CacheRecord::new(key.clone(), value);
                record.on_store();
                self.records.insert(key, record);
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.records
            .remove(key)
            .map(|record| record.value().clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// Loads the requested keys and returns the entries that were stored.
    ///
    /// All-or-nothing: every value is fetched before the first store, so a
    /// loader failure leaves the container as it was.
    pub fn load_all(
        &mut self,
        keys: &[String],
        replace_existing: bool,
        loader: &dyn CacheLoader,
    ) -> GridResult<Vec<(String, Value)>> {
        let mut loaded = Vec::new();

        for key in keys {
            if !replace_existing && self.records.contains_key(key) {
                continue;
            }
            match loader.load(&self.name, key) {
                Ok(Some(value)) => loaded.push((key.clone(), value)),
                Ok(None) => continue,
                Err(e) => return Err(loader_failure(&self.name, e)),
            }
        }

        for (key, value) in &loaded {
            self.put(key.clone(), value.clone());
        }

        tracing::debug!("Loaded {} of {} keys into '{}'", loaded.len(), keys.len(), self.name);
        Ok(loaded)
    }

    pub fn record(&self, key: &str) -> Option<&CacheRecord> {
        self.records.get(key)
    }

    pub fn statistics(&self, key: &str) -> Option<RecordStatistics> {
        self.records.get(key).map(|record| record.statistics().clone())
    }

    pub fn total_cost(&self) -> u64 {
        self.records.values().map(|record| record.cost()).sum()
    }

    // --- Backup side ---

    /// Backup copy of a store. A record already holding `value` is left untouched.
    pub fn apply_put(&mut self, key: String, value: Value) {
        match self.records.get(&key) {
            Some(record) if record.value() == &value => {}
            _ => {
                self.put(key, value);
            }
        }
    }

    pub fn apply_remove(&mut self, key: &str) {
        self.records.remove(key);
    }

    pub fn apply_put_all(&mut self, entries: Vec<(String, Value)>) {
        for (key, value) in entries {
            self.apply_put(key, value);
        }
    }
}

fn loader_failure(cache: &str, err: anyhow::Error) -> GridError {
    match err.downcast::<GridError>() {
        Ok(grid_err) if grid_err.is_fatal() => grid_err,
        Ok(grid_err) => GridError::owner_execution("CacheLoadAll", cache, grid_err.to_string()),
        Err(other) => GridError::owner_execution("CacheLoadAll", cache, other.to_string()),
    }
}
