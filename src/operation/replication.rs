//! Backup Replication
//!
//! After the owner has run an operation the caller is answered at once; the
//! backup effect travels afterwards. Each partition has one lane, a task that
//! delivers its backups one at a time and to the replicas in replica order.
//! Jobs are queued by the partition thread right after execution, so backups
//! of one partition reach every backup in owner execution order.

use super::transport::Transport;
use super::types::{BackupKind, Operation};
use crate::error::GridError;
use crate::membership::types::NodeId;
use crate::partition::PartitionId;

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// One owner effect addressed to the backups of a replica set.
struct BackupJob {
    op: Operation,
    kind: BackupKind,
    targets: Vec<NodeId>,
}

pub struct BackupReplicator {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    lanes: DashMap<PartitionId, mpsc::UnboundedSender<BackupJob>>,
    pending: Arc<AtomicUsize>,
}

impl BackupReplicator {
    /// Lanes run on the runtime current at construction, since jobs are
    /// queued from partition threads.
    ///
    /// # Panics
    /// Outside a Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            runtime: Handle::current(),
            lanes: DashMap::new(),
            pending: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Queues `kind` for every target. Never waits for delivery and may be
    /// called from any thread.
    pub fn replicate(&self, op: &Operation, kind: BackupKind, targets: &[NodeId]) {
        if targets.is_empty() {
            return;
        }

        let job = BackupJob {
            op: op.clone(),
            kind,
            targets: targets.to_vec(),
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        let lane = self
            .lanes
            .entry(op.partition_id())
            .or_insert_with(|| self.spawn_lane(op.partition_id()));

        if let Err(mpsc::error::SendError(job)) = lane.send(job) {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(
                "Backup lane of partition {} is closed; dropped {} for '{}'",
                job.op.partition_id(),
                job.kind.label(),
                job.op.name()
            );
        }
    }

    /// Backup jobs queued and not yet fully delivered.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    fn spawn_lane(&self, partition: PartitionId) -> mpsc::UnboundedSender<BackupJob> {
        let (tx, mut rx) = mpsc::unbounded_channel::<BackupJob>();
        let transport = self.transport.clone();
        let pending = self.pending.clone();

        self.runtime.spawn(async move {
            tracing::debug!("Backup lane for partition {} started", partition);
            while let Some(job) = rx.recv().await {
                deliver(transport.as_ref(), job).await;
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tx
    }
}

async fn deliver(transport: &dyn Transport, job: BackupJob) {
    for (index, target) in job.targets.iter().enumerate() {
        let backup = job.op.backup(job.kind.clone(), index + 1);
        if let Err(e) = transport.backup(target, backup).await {
            let err = GridError::BackupPropagation {
                kind: job.kind.label().to_string(),
                name: job.op.name().to_string(),
                target: target.to_string(),
                message: e.to_string(),
            };
            tracing::warn!("{}", err);
        }
    }
}
