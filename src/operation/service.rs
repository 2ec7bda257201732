//! Operation Dispatch
//!
//! `OperationService` is the single entry point for issuing work. It resolves
//! the owner of the target partition, runs the operation there (locally on a
//! partition thread, or remotely through the `Transport`), answers the caller
//! and only then hands any backup effect to the `BackupReplicator`.

use super::executor::{BackupRoute, PartitionExecutor};
use super::protocol::StatsResponse;
use super::replication::BackupReplicator;
use super::transport::Transport;
use super::types::{BackupOperation, Operation, OperationKind, OperationResponse, ServiceKind};
use crate::container::PartitionStore;
use crate::error::{GridError, GridResult};
use crate::invocation::InvocationFuture;
use crate::membership::types::NodeId;
use crate::partition::{PartitionId, PartitionRouter};

use std::sync::Arc;

pub struct OperationService {
    router: Arc<PartitionRouter>,
    executor: Arc<PartitionExecutor>,
    transport: Arc<dyn Transport>,
    replicator: Arc<BackupReplicator>,
}

impl OperationService {
    pub fn new(
        router: Arc<PartitionRouter>,
        executor: Arc<PartitionExecutor>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let replicator = BackupReplicator::new(transport.clone());
        Arc::new(Self {
            router,
            executor,
            transport,
            replicator,
        })
    }

    pub fn local_id(&self) -> &NodeId {
        self.router.local_node()
    }

    pub fn router(&self) -> &Arc<PartitionRouter> {
        &self.router
    }

    pub fn store(&self) -> &Arc<PartitionStore> {
        self.executor.store()
    }

    pub fn replicator(&self) -> &Arc<BackupReplicator> {
        &self.replicator
    }

    /// Builds an operation addressed by this node's router.
    pub fn new_operation(&self, service: ServiceKind, name: &str, kind: OperationKind) -> Operation {
        Operation::new(&self.router, service, name, kind)
    }

    /// Issues `op` and returns at once. The outcome arrives through the future.
    pub fn dispatch(self: &Arc<Self>, op: Operation) -> InvocationFuture {
        let future = InvocationFuture::new();
        self.submit(op, future.clone());
        future
    }

    /// Issues `op` and completes `future` with its outcome.
    ///
    /// Lets a caller register the future (for tracking or a callback) before
    /// the operation is in flight.
    pub fn submit(self: &Arc<Self>, op: Operation, future: InvocationFuture) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                future.complete(Err(GridError::illegal_state(
                    "dispatch requires a running Tokio runtime",
                )));
                return;
            }
        };

        tracing::trace!(
            "Dispatching {} on '{}' as {:?}",
            op.kind().label(),
            op.name(),
            future.handle()
        );

        let service = self.clone();
        runtime.spawn(async move {
            let result = service.invoke(op).await;
            future.complete(result);
        });
    }

    async fn invoke(&self, op: Operation) -> GridResult<OperationResponse> {
        let replicas = self.router.resolve_replicas(op.partition_id());
        let owner = replicas
            .owner()
            .cloned()
            .ok_or_else(|| self.routing_stale(op.partition_id(), None))?;

        if &owner == self.local_id() {
            self.execute_as_owner(op).await
        } else {
            tracing::trace!(
                "Forwarding {} for partition {} to {}",
                op.kind().label(),
                op.partition_id(),
                owner
            );
            self.transport.execute(&owner, op).await
        }
    }

    /// Runs `op` on this node, which must currently own its partition.
    ///
    /// The caller is answered as soon as the owner has applied the effect.
    /// The partition thread has queued the backups by then; they are
    /// delivered in the background.
    pub async fn execute_as_owner(&self, op: Operation) -> GridResult<OperationResponse> {
        let replicas = self.router.resolve_replicas(op.partition_id());
        if !replicas.is_owner(self.local_id()) {
            return Err(self.routing_stale(op.partition_id(), replicas.owner().cloned()));
        }

        let route = BackupRoute {
            replicator: self.replicator.clone(),
            targets: replicas.backups().to_vec(),
        };
        let name = op.name().to_string();
        let executed = self.executor.run(op, route).await?;

        if let Some(kind) = &executed.backup {
            tracing::debug!(
                "{} on '{}' queued for {} backup(s)",
                kind.label(),
                name,
                replicas.backups().len()
            );
        }

        Ok(executed.response)
    }

    /// Applies a backup effect sent by the owner. `Ok(false)` marks a replay.
    pub async fn apply_backup(&self, op: BackupOperation) -> GridResult<bool> {
        self.executor.run_backup(op).await
    }

    pub fn stats(&self) -> StatsResponse {
        let membership = self.router.membership();
        StatsResponse {
            node_id: self.local_id().to_string(),
            epoch: membership.epoch(),
            alive_members: membership.get_alive_members().len(),
            primary_partitions: self.router.my_primary_partitions().len(),
            backup_partitions: self.router.my_backup_partitions().len(),
            containers: self.store().container_count(),
        }
    }

    fn routing_stale(&self, partition: PartitionId, owner: Option<NodeId>) -> GridError {
        GridError::RoutingStale {
            partition,
            target: self.local_id().to_string(),
            owner: owner.map(|id| id.to_string()),
        }
    }
}
