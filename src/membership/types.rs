use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    Suspect,
    Dead,
}

/// A single member of the grid as seen by this node.
///
/// `incarnation` is the member's logical clock: a state claim is only accepted
/// when it carries a higher incarnation than the one already known, except that
/// an `Alive` claim at the same incarnation refutes a `Suspect`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub http_addr: SocketAddr,
    pub state: NodeState,
    pub incarnation: u64,
}

impl Node {
    pub fn alive(id: NodeId, http_addr: SocketAddr) -> Self {
        Self {
            id,
            http_addr,
            state: NodeState::Alive,
            incarnation: 1,
        }
    }
}

/// Membership-change notifications pushed by the cluster membership service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MembershipEvent {
    Joined { node: Node },
    StateChanged {
        node_id: NodeId,
        state: NodeState,
        incarnation: u64,
    },
    Left { node_id: NodeId },
}
