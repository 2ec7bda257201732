//! Grid Error Taxonomy
//!
//! Every failure the dispatch core can report. The enum is serializable so a
//! failure raised on a remote owner crosses the transport unchanged and reaches
//! the caller's `InvocationFuture` with the same variant.
//!
//! ## Propagation
//! - Delivered to the caller: `RoutingStale`, `OwnerExecution`,
//!   `ReservationProtocolViolation`, `LifecycleViolation`, `Timeout`,
//!   `Transport`, `IllegalState`.
//! - Logged only: `BackupPropagation` (never fails the original call).
//! - Re-raised: `FatalResourceExhaustion` (never handed to a listener as an
//!   ordinary failure).

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type GridResult<T> = std::result::Result<T, GridError>;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum GridError {
    /// The resolved owner is no longer (or never was) the owner of the partition.
    #[error("partition {partition} is not owned by {target} (current owner: {owner:?})")]
    RoutingStale {
        partition: u32,
        target: String,
        owner: Option<String>,
    },

    /// The owner ran the operation and the container raised a domain error.
    #[error("{kind} on '{name}' failed on owner: {message}")]
    OwnerExecution {
        kind: String,
        name: String,
        message: String,
    },

    #[error("backup {kind} on '{name}' to {target} failed: {message}")]
    BackupPropagation {
        kind: String,
        name: String,
        target: String,
        message: String,
    },

    /// Commit or rollback referenced an id that was never issued or is already consumed.
    #[error("reservation {reservation_id} in '{name}' is unknown or already consumed")]
    ReservationProtocolViolation { name: String, reservation_id: u64 },

    #[error("'{name}': {reason}")]
    LifecycleViolation { name: String, reason: String },

    #[error("fatal resource exhaustion: {message}")]
    FatalResourceExhaustion { message: String },

    #[error("timed out after {waited_ms}ms waiting for invocation")]
    Timeout { waited_ms: u64 },

    #[error("transport to {target} failed: {message}")]
    Transport { target: String, message: String },

    #[error("illegal state: {message}")]
    IllegalState { message: String },
}

impl GridError {
    pub fn owner_execution(kind: &str, name: &str, message: impl Into<String>) -> Self {
        GridError::OwnerExecution {
            kind: kind.to_string(),
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub fn lifecycle(name: &str, reason: impl Into<String>) -> Self {
        GridError::LifecycleViolation {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        GridError::IllegalState {
            message: message.into(),
        }
    }

    pub fn unexpected_response(kind: &str, response: impl std::fmt::Debug) -> Self {
        GridError::illegal_state(format!("unexpected response to {}: {:?}", kind, response))
    }

    /// Out-of-memory class failures. Tracking state can't be trusted after one.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GridError::FatalResourceExhaustion { .. })
    }

    /// Failures an external retry collaborator may resolve by re-resolving the owner.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GridError::RoutingStale { .. } | GridError::Transport { .. }
        )
    }
}
