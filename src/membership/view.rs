use super::types::{MembershipEvent, Node, NodeId, NodeState};

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// This node's view of the member table.
///
/// The table is owned by the external membership service; the dispatch core
/// only reads it, and learns about changes through [`MembershipView::apply`].
/// Every effective change bumps `epoch`, so a `ReplicaSet` resolved in an older
/// epoch can be recognised as possibly stale.
pub struct MembershipView {
    pub local_node: Node,
    members: DashMap<NodeId, Node>,
    epoch: AtomicU64,
}

impl MembershipView {
    pub fn new(local_node: Node) -> Arc<Self> {
        Self::with_members(local_node, Vec::new())
    }

    pub fn with_members(local_node: Node, members: Vec<Node>) -> Arc<Self> {
        let table = DashMap::new();
        table.insert(local_node.id.clone(), local_node.clone());
        for member in members {
            table.insert(member.id.clone(), member);
        }

        Arc::new(Self {
            local_node,
            members: table,
            epoch: AtomicU64::new(1),
        })
    }

    pub fn local_id(&self) -> &NodeId {
        &self.local_node.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn get_member(&self, id: &NodeId) -> Option<Node> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn get_alive_members(&self) -> Vec<Node> {
        self.members
            .iter()
            .filter(|entry| entry.value().state == NodeState::Alive)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Applies a membership-change notification. Returns `true` if the table changed.
    pub fn apply(&self, event: MembershipEvent) -> bool {
        let changed = match event {
            MembershipEvent::Joined { node } => self.merge_member(node),
            MembershipEvent::StateChanged {
                node_id,
                state,
                incarnation,
            } => self.merge_state(&node_id, state, incarnation),
            MembershipEvent::Left { node_id } => {
                if node_id == self.local_node.id {
                    tracing::warn!("Ignoring departure notice for the local node");
                    false
                } else {
                    self.members.remove(&node_id).is_some()
                }
            }
        };

        if changed {
            let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            tracing::info!(
                "Membership changed: {} members, {} alive (epoch {})",
                self.members.len(),
                self.get_alive_members().len(),
                epoch
            );
        }

        changed
    }

    fn merge_member(&self, node: Node) -> bool {
        match self.members.get_mut(&node.id) {
            Some(mut existing) => {
                if node.incarnation > existing.incarnation {
                    tracing::debug!(
                        "Updating {}: inc {} -> {}",
                        node.id,
                        existing.incarnation,
                        node.incarnation
                    );
                    *existing = node;
                    true
                } else {
                    false
                }
            }
            None => {
                tracing::info!("Member {} joined at {}", node.id, node.http_addr);
                self.members.insert(node.id.clone(), node);
                true
            }
        }
    }

    fn merge_state(&self, node_id: &NodeId, state: NodeState, incarnation: u64) -> bool {
        let Some(mut existing) = self.members.get_mut(node_id) else {
            tracing::debug!("State change for unknown member {}", node_id);
            return false;
        };

        if incarnation > existing.incarnation {
            existing.state = state;
            existing.incarnation = incarnation;
            true
        } else if incarnation == existing.incarnation
            && state == NodeState::Alive
            && existing.state == NodeState::Suspect
        {
            tracing::info!("{} refuted suspicion", node_id);
            existing.state = NodeState::Alive;
            true
        } else {
            false
        }
    }
}
