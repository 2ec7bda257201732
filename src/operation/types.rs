use crate::partition::{PartitionId, PartitionRouter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which container family an operation targets. Containers of different
/// families never share a name space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServiceKind {
    Cache,
    Queue,
}

/// Kind-specific payload of an [`Operation`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OperationKind {
    /// Drops the container. `is_local` keeps the drop on the owner only.
    Destroy { is_local: bool },

    CacheGet { key: String },
    CachePut { key: String, value: Value },
    CacheRemove { key: String },
    CacheContainsKey { key: String },
    CacheSize,
    CacheLoadAll {
        keys: Vec<String>,
        replace_existing: bool,
    },

    QueueOffer { value: Value },
    QueuePoll,
    QueuePeek,
    QueueSize,

    /// Fresh reservation id for a transactional offer.
    TxnReserveId,
    /// Detaches the head item under a fresh reservation id.
    TxnReservePoll,
    TxnCommitOffer { reservation_id: u64, value: Value },
    TxnCommitPoll { reservation_id: u64 },
    TxnRollback { reservation_id: u64 },
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Destroy { .. } => "Destroy",
            OperationKind::CacheGet { .. } => "CacheGet",
            OperationKind::CachePut { .. } => "CachePut",
            OperationKind::CacheRemove { .. } => "CacheRemove",
            OperationKind::CacheContainsKey { .. } => "CacheContainsKey",
            OperationKind::CacheSize => "CacheSize",
            OperationKind::CacheLoadAll { .. } => "CacheLoadAll",
            OperationKind::QueueOffer { .. } => "QueueOffer",
            OperationKind::QueuePoll => "QueuePoll",
            OperationKind::QueuePeek => "QueuePeek",
            OperationKind::QueueSize => "QueueSize",
            OperationKind::TxnReserveId => "TxnReserveId",
            OperationKind::TxnReservePoll => "TxnReservePoll",
            OperationKind::TxnCommitOffer { .. } => "TxnCommitOffer",
            OperationKind::TxnCommitPoll { .. } => "TxnCommitPoll",
            OperationKind::TxnRollback { .. } => "TxnRollback",
        }
    }

    /// Whether a successful run on the owner may have to be mirrored on backups.
    ///
    /// The owner still decides per run: a poll of an empty queue, for instance,
    /// changes nothing and produces no backup.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            OperationKind::CacheGet { .. }
                | OperationKind::CacheContainsKey { .. }
                | OperationKind::CacheSize
                | OperationKind::QueuePeek
                | OperationKind::QueueSize
        )
    }
}

/// The atomic unit of routed work.
///
/// The partition is resolved once, at construction, and can't change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    op_id: String,
    service: ServiceKind,
    name: String,
    partition_id: PartitionId,
    kind: OperationKind,
}

impl Operation {
    pub fn new(
        router: &PartitionRouter,
        service: ServiceKind,
        name: &str,
        kind: OperationKind,
    ) -> Self {
        Self {
            op_id: uuid::Uuid::new_v4().to_string(),
            service,
            name: name.to_string(),
            partition_id: router.resolve_partition(name),
            kind,
        }
    }

    pub fn op_id(&self) -> &str {
        &self.op_id
    }

    pub fn service(&self) -> ServiceKind {
        self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    /// Wraps an owner-derived backup effect into the operation sent to one backup.
    pub fn backup(&self, kind: BackupKind, replica_index: usize) -> BackupOperation {
        BackupOperation {
            op_id: self.op_id.clone(),
            service: self.service,
            name: self.name.clone(),
            partition_id: self.partition_id,
            replica_index,
            kind,
        }
    }
}

/// Minimal state a backup needs to reproduce an owner's effect.
///
/// Every kind is idempotent: applying it twice leaves the same state as once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BackupKind {
    Destroy,
    CachePut { key: String, value: Value },
    CacheRemove { key: String },
    CachePutAll { entries: Vec<(String, Value)> },
    QueueOffer { item_id: u64, value: Value },
    QueuePoll { item_id: u64 },
    TxnReserveOffer { reservation_id: u64 },
    TxnReserve { reservation_id: u64, item_id: u64 },
    TxnCommitOffer { reservation_id: u64, value: Value },
    TxnPollBackup { reservation_id: u64 },
    TxnRollback { reservation_id: u64 },
}

impl BackupKind {
    pub fn label(&self) -> &'static str {
        match self {
            BackupKind::Destroy => "DestroyBackup",
            BackupKind::CachePut { .. } => "CachePutBackup",
            BackupKind::CacheRemove { .. } => "CacheRemoveBackup",
            BackupKind::CachePutAll { .. } => "CachePutAllBackup",
            BackupKind::QueueOffer { .. } => "QueueOfferBackup",
            BackupKind::QueuePoll { .. } => "QueuePollBackup",
            BackupKind::TxnReserveOffer { .. } => "TxnReserveOfferBackup",
            BackupKind::TxnReserve { .. } => "TxnReserveBackup",
            BackupKind::TxnCommitOffer { .. } => "TxnCommitOfferBackup",
            BackupKind::TxnPollBackup { .. } => "TxnPollBackup",
            BackupKind::TxnRollback { .. } => "TxnRollbackBackup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupOperation {
    /// Id of the owner operation this backup was derived from.
    pub op_id: String,
    pub service: ServiceKind,
    pub name: String,
    pub partition_id: PartitionId,
    /// Position of the target in the replica set (1 = first backup).
    pub replica_index: usize,
    pub kind: BackupKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum OperationResponse {
    Done,
    Value(Option<Value>),
    Bool(bool),
    Size(usize),
    ReservationId(u64),
    Reservation {
        reservation_id: u64,
        item: Option<Value>,
    },
    Loaded { count: usize },
}

/// Result of running an operation on its owner: what the caller sees, plus the
/// effect to mirror on backups if anything changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub response: OperationResponse,
    pub backup: Option<BackupKind>,
}

impl Executed {
    pub fn read(response: OperationResponse) -> Self {
        Self {
            response,
            backup: None,
        }
    }

    pub fn mutated(response: OperationResponse, backup: BackupKind) -> Self {
        Self {
            response,
            backup: Some(backup),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserving_an_id_counts_as_mutating() {
        assert!(OperationKind::TxnReserveId.is_mutating());
        assert!(OperationKind::TxnReservePoll.is_mutating());
        assert!(OperationKind::Destroy { is_local: true }.is_mutating());

        assert!(!OperationKind::QueuePeek.is_mutating());
        assert!(!OperationKind::CacheGet { key: "k".to_string() }.is_mutating());
    }
}
