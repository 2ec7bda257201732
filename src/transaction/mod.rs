//! Queue Transactions
//!
//! A transaction runs the reserve -> commit/rollback protocol against the
//! owner of one queue:
//! - **Reserve**: the owner issues a reservation id, strictly increasing per
//!   queue. A poll detaches its item under that id.
//! - **Commit**: applies the reserved effect and consumes the id.
//! - **Rollback**: releases the reservation and consumes the id.
//!
//! Each step is an ordinary `Operation`, so commits and rollbacks reach the
//! backups through the same background replication as any other mutation.
//! A transaction whose timeout passed before commit is rolled back.

pub mod context;

pub use context::{QueueTransaction, TransactionState};
