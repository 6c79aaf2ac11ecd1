use crate::cluster::{Epoch, NodeId};

/// What a control command asks of its target.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandKind {
    /// Target becomes Primary; everyone else follows it.
    Promote,
    /// Target steps down to Secondary. Nobody follows it anymore.
    Demote,
    /// Target leaves the replica set for good.
    Remove,
}

/// ControlCommand is the controller-to-node message. The controller broadcasts each command to
/// every reachable member, and each member applies it to its own role and membership view.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ControlCommand {
    pub epoch: Epoch,
    pub kind: CommandKind,
    pub target: NodeId,
}

impl ControlCommand {
    pub fn promote(epoch: Epoch, target: NodeId) -> Self {
        ControlCommand {
            epoch,
            kind: CommandKind::Promote,
            target,
        }
    }

    pub fn demote(epoch: Epoch, target: NodeId) -> Self {
        ControlCommand {
            epoch,
            kind: CommandKind::Demote,
            target,
        }
    }

    pub fn remove(epoch: Epoch, target: NodeId) -> Self {
        ControlCommand {
            epoch,
            kind: CommandKind::Remove,
            target,
        }
    }
}
