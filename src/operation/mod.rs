//! Operation Dispatch & Backup Replication
//!
//! Every request to the grid is an `Operation` addressed to the partition that
//! owns its container.
//!
//! ## Core Concepts
//! - **Owner execution**: an operation runs once, on the owner, on the partition
//!   thread bound to its partition (`executor`).
//! - **Ack after owner**: the caller gets the owner's result as soon as the owner
//!   has applied it. Mutating operations then produce a `BackupOperation` that
//!   is pushed to each backup in replica order by a per-partition lane
//!   (`replication`). Backup failures are logged and never fail the call.
//! - **Stale routing**: a node asked to run an operation for a partition it does
//!   not own answers `RoutingStale` with the owner it believes in.
//! - **Transport**: `transport::Transport` abstracts node-to-node calls; the
//!   HTTP form uses the endpoints in `protocol`, served by `handlers`.

pub mod executor;
pub mod handlers;
pub mod protocol;
pub mod replication;
pub mod service;
pub mod transport;
pub mod types;

pub use executor::PartitionExecutor;
pub use service::OperationService;
pub use transport::{HttpTransport, LocalTransport, Transport};
pub use types::{
    BackupKind, BackupOperation, Operation, OperationKind, OperationResponse, ServiceKind,
};

#[cfg(test)]
mod tests;
