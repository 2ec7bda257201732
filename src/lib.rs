//! In-Memory Data Grid Dispatch Core
//!
//! This library crate holds the operation-dispatch and replication core of a
//! partitioned in-memory data grid. It is the foundation for the node binary
//! (`main.rs`).
//!
//! ## Architecture Modules
//! - **`partition`**: maps container names to partitions and partitions to an
//!   owner plus ordered backups.
//! - **`operation`**: the `Operation` model, partition threads, owner execution,
//!   background backup replication and node-to-node transport.
//! - **`invocation`**: `InvocationFuture`, the caller's handle to a dispatched operation.
//! - **`transaction`**: reserve -> commit/rollback over partitioned queues.
//! - **`proxy`**: client-facing proxies and their open/closed/destroyed lifecycle.
//! - **`record`**: cache records and the statistics that feed eviction.
//! - **`container`**: the per-partition caches and queues the operations act on.
//! - **`membership`**: node identity and the member table supplied by the
//!   external membership service.
//! - **`config`** and **`error`**: ambient configuration and the error taxonomy.

pub mod config;
pub mod container;
pub mod error;
pub mod invocation;
pub mod membership;
pub mod operation;
pub mod partition;
pub mod proxy;
pub mod record;
pub mod transaction;

#[cfg(test)]
pub(crate) mod testing;
