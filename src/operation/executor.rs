//! Partition Threads
//!
//! Every partition is bound to exactly one OS thread, so operations on the
//! same partition never run concurrently and run in arrival order. Callers on
//! the async side hand work over a channel and await the reply.
//!
//! The partition thread also queues the backup effect of an owner run before
//! replying, so a partition's backup lane sees effects in execution order.

use super::replication::BackupReplicator;
use super::types::{BackupOperation, Executed, Operation};
use crate::container::PartitionStore;
use crate::error::{GridError, GridResult};
use crate::membership::types::NodeId;
use crate::partition::PartitionId;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Backups an owner run is mirrored to.
pub struct BackupRoute {
    pub replicator: Arc<BackupReplicator>,
    pub targets: Vec<NodeId>,
}

enum PartitionTask {
    Execute {
        op: Operation,
        route: BackupRoute,
        reply: oneshot::Sender<GridResult<Executed>>,
    },
    Backup {
        op: BackupOperation,
        reply: oneshot::Sender<GridResult<bool>>,
    },
}

pub struct PartitionExecutor {
    store: Arc<PartitionStore>,
    lanes: Vec<mpsc::UnboundedSender<PartitionTask>>,
}

impl PartitionExecutor {
    /// Spawns `worker_count` partition threads. They stop once the executor is dropped.
    pub fn start(store: Arc<PartitionStore>, worker_count: usize) -> Result<Arc<Self>> {
        let worker_count = worker_count.max(1);
        let mut lanes = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let (tx, rx) = mpsc::unbounded_channel();
            let worker_store = store.clone();
            std::thread::Builder::new()
                .name(format!("partition-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, worker_store, rx))
                .with_context(|| format!("Failed to spawn partition worker {}", worker_id))?;
            lanes.push(tx);
        }

        tracing::info!("Partition executor started with {} threads", worker_count);
        Ok(Arc::new(Self { store, lanes }))
    }

    pub fn store(&self) -> &Arc<PartitionStore> {
        &self.store
    }

    pub fn worker_count(&self) -> usize {
        self.lanes.len()
    }

    fn lane(&self, partition: PartitionId) -> &mpsc::UnboundedSender<PartitionTask> {
        &self.lanes[partition as usize % self.lanes.len()]
    }

    /// Runs `op` as owner on its partition thread and queues any backup
    /// effect on `route` before answering.
    pub async fn run(&self, op: Operation, route: BackupRoute) -> GridResult<Executed> {
        let (reply, rx) = oneshot::channel();
        self.lane(op.partition_id())
            .send(PartitionTask::Execute { op, route, reply })
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    /// Applies a backup effect on its partition thread.
    pub async fn run_backup(&self, op: BackupOperation) -> GridResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.lane(op.partition_id)
            .send(PartitionTask::Backup { op, reply })
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }
}

fn stopped() -> GridError {
    GridError::illegal_state("partition thread is not running")
}

fn worker_loop(
    worker_id: usize,
    store: Arc<PartitionStore>,
    mut rx: mpsc::UnboundedReceiver<PartitionTask>,
) {
    tracing::debug!("Partition worker {} started", worker_id);

    while let Some(task) = rx.blocking_recv() {
        match task {
            PartitionTask::Execute { op, route, reply } => {
                let result = store.execute(&op);
                match &result {
                    Ok(executed) => {
                        if let Some(kind) = &executed.backup {
                            debug_assert!(
                                op.kind().is_mutating(),
                                "{} produced a backup effect",
                                op.kind().label()
                            );
                            route.replicator.replicate(&op, kind.clone(), &route.targets);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(
                            "{} on '{}' (partition {}) failed: {}",
                            op.kind().label(),
                            op.name(),
                            op.partition_id(),
                            e
                        );
                    }
                }
                // Caller may have given up waiting; the effect stands regardless.
                let _ = reply.send(result);
            }
            PartitionTask::Backup { op, reply } => {
                let _ = reply.send(store.apply_backup(&op));
            }
        }
    }

    tracing::debug!("Partition worker {} stopped", worker_id);
}
