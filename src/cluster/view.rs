use crate::cluster::{Epoch, MemberInfo, NodeId, Role};
use crate::oplog::SeqNo;
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// The controller's record of one member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub addr: SocketAddr,
    pub role: Role,
    pub last_applied: SeqNo,
    pub reachable: bool,
}

/// ClusterView is the controller's picture of the replica set: who is in it, who is primary,
/// and the current epoch.
///
/// There is at most one Primary per epoch. During a failover there may be none.
#[derive(Clone, Debug)]
pub struct ClusterView {
    nodes: BTreeMap<NodeId, NodeRecord>,
    primary: Option<NodeId>,
    epoch: Epoch,
}

impl ClusterView {
    pub(crate) fn new(members: &[MemberInfo]) -> Self {
        let nodes = members
            .iter()
            .map(|m| {
                let id = NodeId::new(m.node_id.clone());
                let record = NodeRecord {
                    id: id.clone(),
                    addr: m.socket_addr(),
                    role: Role::Uninitialized,
                    last_applied: SeqNo::ZERO,
                    reachable: true,
                };
                (id, record)
            })
            .collect();

        ClusterView {
            nodes,
            primary: None,
            epoch: Epoch::default(),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn primary(&self) -> Option<&NodeId> {
        self.primary.as_ref()
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    pub fn role_of(&self, id: &NodeId) -> Option<Role> {
        self.nodes.get(id).map(|n| n.role)
    }

    /// Members that are neither removed nor known to be down.
    pub(crate) fn live_node_ids(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|n| n.reachable && n.role != Role::Removed)
            .map(|n| n.id.clone())
            .collect()
    }

    /// Record that `target` was promoted at `epoch`. Every other non-removed member becomes
    /// Secondary.
    pub(crate) fn record_promotion(&mut self, target: &NodeId, epoch: Epoch) {
        assert!(
            epoch >= self.epoch,
            "Can't move cluster epoch backwards. Expected [input] {:?} >= {:?} [current]",
            epoch,
            self.epoch,
        );

        for node in self.nodes.values_mut() {
            if node.role == Role::Removed {
                continue;
            }
            node.role = if &node.id == target {
                Role::Primary
            } else {
                Role::Secondary
            };
        }
        self.primary = Some(target.clone());
        self.epoch = epoch;
    }

    /// Record that the current primary stepped down (or was removed) at `epoch`, leaving the
    /// set without a primary until the next promotion.
    pub(crate) fn record_primary_loss(&mut self, epoch: Epoch, new_role: Role) {
        if let Some(old) = self.primary.take() {
            if let Some(node) = self.nodes.get_mut(&old) {
                node.role = new_role;
            }
        }
        if epoch > self.epoch {
            self.epoch = epoch;
        }
    }

    pub(crate) fn mark_removed(&mut self, id: &NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.role = Role::Removed;
            node.reachable = false;
        }
        if self.primary.as_ref() == Some(id) {
            self.primary = None;
        }
    }

    pub(crate) fn set_reachable(&mut self, id: &NodeId, reachable: bool) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.reachable = reachable;
        }
    }

    pub(crate) fn set_last_applied(&mut self, id: &NodeId, last_applied: SeqNo) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.last_applied = last_applied;
        }
    }

    /// The reachable secondary with the longest log, if any. Ties go to the lowest node id.
    pub(crate) fn most_caught_up_secondary(&self) -> Option<NodeId> {
        let mut best: Option<&NodeRecord> = None;
        for node in self.nodes.values() {
            if !node.reachable || node.role != Role::Secondary {
                continue;
            }
            match best {
                Some(b) if b.last_applied >= node.last_applied => {}
                _ => best = Some(node),
            }
        }

        best.map(|n| n.id.clone())
    }
}
