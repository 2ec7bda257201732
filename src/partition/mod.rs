//! Partition Routing
//!
//! Names are hashed onto a fixed number of partitions; each partition is placed
//! on the alive members as one owner followed by its backups.
//!
//! ## Core Concepts
//! - **Partitioning**: `resolve_partition(name)` is stable for the grid's lifetime.
//! - **Placement**: alive members sorted by id; the owner is `partition % n` and
//!   backups follow in ring order, capped at `n - 1`.

pub mod router;

pub use router::{PartitionId, PartitionRouter, ReplicaSet};
