//! In-process cluster used by the multi-node tests.

use crate::container::{CacheLoader, PartitionStore};
use crate::membership::types::{Node, NodeId};
use crate::membership::view::MembershipView;
use crate::operation::{LocalTransport, OperationService, PartitionExecutor};
use crate::partition::{PartitionRouter, ReplicaSet};

use std::sync::Arc;
use std::time::Duration;

pub const PARTITIONS: u32 = 16;

pub struct TestCluster {
    pub transport: Arc<LocalTransport>,
    pub nodes: Vec<Arc<OperationService>>,
}

impl TestCluster {
    pub fn start(node_count: usize, backup_count: usize) -> Self {
        Self::with_loader(node_count, backup_count, None)
    }

    pub fn with_loader(
        node_count: usize,
        backup_count: usize,
        loader: Option<Arc<dyn CacheLoader>>,
    ) -> Self {
        let members: Vec<Node> = (0..node_count)
            .map(|i| {
                Node::alive(
                    NodeId(format!("node-{}", i)),
                    format!("127.0.0.1:{}", 7000 + i).parse().unwrap(),
                )
            })
            .collect();

        let transport = LocalTransport::new();
        let nodes = members
            .iter()
            .map(|local| {
                let others = members
                    .iter()
                    .filter(|member| member.id != local.id)
                    .cloned()
                    .collect();
                let view = MembershipView::with_members(local.clone(), others);
                let router = PartitionRouter::new(view, PARTITIONS, backup_count);
                let store = PartitionStore::new(loader.clone(), None);
                let executor = PartitionExecutor::start(store, 2).unwrap();
                let service = OperationService::new(router, executor, transport.clone());
                transport.register(&service);
                service
            })
            .collect();

        Self { transport, nodes }
    }

    pub fn node(&self, id: &NodeId) -> &Arc<OperationService> {
        self.nodes
            .iter()
            .find(|node| node.local_id() == id)
            .unwrap()
    }

    pub fn replicas_of(&self, name: &str) -> ReplicaSet {
        let router = self.nodes[0].router();
        router.resolve_replicas(router.resolve_partition(name))
    }

    pub fn owner_of(&self, name: &str) -> &Arc<OperationService> {
        let replicas = self.replicas_of(name);
        self.node(replicas.owner().unwrap())
    }

    pub fn backups_of(&self, name: &str) -> Vec<&Arc<OperationService>> {
        self.replicas_of(name)
            .backups()
            .iter()
            .map(|id| self.node(id))
            .collect()
    }

    /// A node holding no replica of `name`, if the cluster is big enough to have one.
    pub fn outsider_of(&self, name: &str) -> Option<&Arc<OperationService>> {
        let replicas = self.replicas_of(name);
        self.nodes
            .iter()
            .find(|node| !replicas.replicas().contains(node.local_id()))
    }

    pub fn non_owner_of(&self, name: &str) -> &Arc<OperationService> {
        let owner = self.owner_of(name).local_id().clone();
        self.nodes
            .iter()
            .find(|node| node.local_id() != &owner)
            .unwrap()
    }

    /// Waits until every owner has drained its backup lanes.
    pub async fn quiesce(&self) -> bool {
        eventually(|| self.nodes.iter().all(|node| node.replicator().pending() == 0)).await
    }
}

/// Polls `condition` for up to two seconds.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
