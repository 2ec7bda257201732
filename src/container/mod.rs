//! Partition Containers
//!
//! The data a partition holds: caches (key -> `CacheRecord`) and queues (FIFO
//! items plus open transactional reservations).
//!
//! ## Core Concepts
//! - **Owner execution**: `PartitionStore::execute` runs an `Operation` against
//!   its container and reports the effect backups must reproduce.
//! - **Backup application**: `PartitionStore::apply_backup` mirrors an effect.
//!   Every backup kind is idempotent, and replays of the same operation id are
//!   skipped outright.
//! - **Reservations**: queue reservation ids are strictly increasing per
//!   container and each one is consumed by exactly one commit or rollback.

pub mod cache;
pub mod queue;
pub mod store;

pub use cache::{CacheContainer, CacheLoader};
pub use queue::{QueueContainer, QueueItem};
pub use store::{Container, ContainerKey, PartitionStore};
