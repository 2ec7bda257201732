use crate::membership::{types::NodeId, view::MembershipView};
use fnv::FnvHasher;
use std::hash::Hasher;
use std::sync::Arc;

pub type PartitionId = u32;

/// Replicas of one partition: index 0 is the owner, the rest are backups in
/// replication order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSet {
    pub partition_id: PartitionId,
    /// Membership epoch the set was resolved in.
    pub epoch: u64,
    replicas: Vec<NodeId>,
}

impl ReplicaSet {
    pub fn new(partition_id: PartitionId, epoch: u64, replicas: Vec<NodeId>) -> Self {
        Self {
            partition_id,
            epoch,
            replicas,
        }
    }

    pub fn owner(&self) -> Option<&NodeId> {
        self.replicas.first()
    }

    pub fn backups(&self) -> &[NodeId] {
        if self.replicas.is_empty() {
            &[]
        } else {
            &self.replicas[1..]
        }
    }

    pub fn replicas(&self) -> &[NodeId] {
        &self.replicas
    }

    pub fn is_owner(&self, node: &NodeId) -> bool {
        self.owner() == Some(node)
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}

/// Maps names to partitions and partitions to replicas.
///
/// `resolve_partition` is a pure function of the name. `resolve_replicas` reads
/// the current member table and may be stale relative to a concurrent change;
/// a node receiving work for a partition it no longer owns answers with
/// `RoutingStale`.
pub struct PartitionRouter {
    pub num_partitions: u32,
    backup_count: usize,
    membership: Arc<MembershipView>,
}

impl PartitionRouter {
    pub fn new(
        membership: Arc<MembershipView>,
        num_partitions: u32,
        backup_count: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            num_partitions: num_partitions.max(1),
            backup_count,
            membership,
        })
    }

    /// FNV-1a over the raw name bytes. Every node must agree on this mapping
    /// whatever toolchain built it, so the hash is fixed rather than std's.
    pub fn resolve_partition(&self, name: &str) -> PartitionId {
        let mut hasher = FnvHasher::default();
        hasher.write(name.as_bytes());
        (hasher.finish() % self.num_partitions as u64) as PartitionId
    }

    pub fn resolve_replicas(&self, partition: PartitionId) -> ReplicaSet {
        let epoch = self.membership.epoch();
        let mut node_ids: Vec<NodeId> = self
            .membership
            .get_alive_members()
            .into_iter()
            .map(|node| node.id)
            .collect();

        if node_ids.is_empty() {
            return ReplicaSet::new(partition, epoch, Vec::new());
        }

        node_ids.sort();
        let owner_idx = partition as usize % node_ids.len();
        let replica_count = (self.backup_count + 1).min(node_ids.len());
        let replicas = (0..replica_count)
            .map(|offset| node_ids[(owner_idx + offset) % node_ids.len()].clone())
            .collect();

        ReplicaSet::new(partition, epoch, replicas)
    }

    pub fn local_node(&self) -> &NodeId {
        self.membership.local_id()
    }

    pub fn membership(&self) -> &Arc<MembershipView> {
        &self.membership
    }

    pub fn my_primary_partitions(&self) -> Vec<PartitionId> {
        let my_id = self.membership.local_id();

        (0..self.num_partitions)
            .filter(|&partition| self.resolve_replicas(partition).is_owner(my_id))
            .collect()
    }

    pub fn my_backup_partitions(&self) -> Vec<PartitionId> {
        let my_id = self.membership.local_id();

        (0..self.num_partitions)
            .filter(|&partition| {
                self.resolve_replicas(partition)
                    .backups()
                    .iter()
                    .any(|backup| backup == my_id)
            })
            .collect()
    }
}
