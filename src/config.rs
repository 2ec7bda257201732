//! Node Configuration
//!
//! `GridConfig` gathers the knobs the dispatch core needs. Every field has a
//! default, so a node starts with no file at all; a JSON file may override any
//! subset and the `grid-node` binary applies its CLI flags on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Fixed for the lifetime of the grid.
    pub partition_count: u32,
    /// Backups per partition, capped by the number of alive members minus one.
    pub backup_count: usize,
    /// Partition threads. Partition `p` always runs on thread `p % worker_count`.
    pub worker_count: usize,
    /// Upper bound on items per queue container. `None` means unbounded.
    pub queue_capacity: Option<usize>,
    pub transaction_timeout_ms: u64,
    pub log_level: String,
    pub invocation: InvocationConfig,
    pub transport: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvocationConfig {
    /// Used by proxies for synchronous calls.
    pub call_timeout_ms: u64,
    /// Wait applied to each tracked invocation when a proxy closes.
    pub close_drain_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub request_timeout_ms: u64,
    pub retry_attempts: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            partition_count: 271,
            backup_count: 1,
            worker_count: 4,
            queue_capacity: None,
            transaction_timeout_ms: 120_000,
            log_level: "info".to_string(),
            invocation: InvocationConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 120_000,
            close_drain_timeout_ms: 10_000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 500,
            retry_attempts: 3,
        }
    }
}

impl TransportConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl GridConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: GridConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            anyhow::bail!("partition_count must be greater than zero");
        }
        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than zero");
        }
        if self.transport.retry_attempts == 0 {
            anyhow::bail!("transport.retry_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation.call_timeout_ms)
    }

    pub fn close_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation.close_drain_timeout_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}
