use crate::cluster::{CommandKind, ControlCommand, Epoch, NodeId, PrimaryLease, Role};
use crate::node::node_api::{ControlError, ControlOutput};
use std::collections::BTreeMap;
use std::net::SocketAddr;

/// RoleManager owns this node's role, epoch and membership view. Roles only change through
/// `apply_command()`, i.e. on the cluster controller's say-so.
pub(crate) struct RoleManager {
    logger: slog::Logger,
    me: NodeId,
    role: Role,
    epoch: Epoch,
    members: BTreeMap<NodeId, SocketAddr>,
    // Primary as of the epoch it was promoted in.
    primary: Option<(NodeId, Epoch)>,
}

impl RoleManager {
    pub(crate) fn new(logger: slog::Logger, me: NodeId, members: BTreeMap<NodeId, SocketAddr>) -> Self {
        RoleManager {
            logger,
            me,
            role: Role::Uninitialized,
            epoch: Epoch::default(),
            members,
            primary: None,
        }
    }

    pub(crate) fn me(&self) -> &NodeId {
        &self.me
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub(crate) fn primary(&self) -> Option<&NodeId> {
        self.primary.as_ref().map(|(id, _)| id)
    }

    pub(crate) fn member_addr(&self, id: &NodeId) -> Option<SocketAddr> {
        self.members.get(id).copied()
    }

    /// Primary this node should be replicating from, if any.
    pub(crate) fn upstream(&self) -> Option<(NodeId, SocketAddr)> {
        if self.role != Role::Secondary {
            return None;
        }
        let primary = self.primary()?;
        if primary == &self.me {
            return None;
        }
        self.member_addr(primary).map(|addr| (primary.clone(), addr))
    }

    /// `Ok` only while this node is Primary. Otherwise returns who it believes the primary is.
    pub(crate) fn primary_lease(&self) -> Result<PrimaryLease, Option<NodeId>> {
        match self.role {
            Role::Primary => Ok(PrimaryLease::new(self.epoch)),
            _ => Err(self.primary().cloned()),
        }
    }

    /// True if a client has already seen a newer epoch than this node, so this node must not act
    /// as its primary. A lower tag only means the client is behind.
    pub(crate) fn is_superseded(&self, tag: Option<Epoch>) -> bool {
        matches!(tag, Some(tag) if tag > self.epoch)
    }

    pub(crate) fn apply_command(&mut self, command: ControlCommand) -> Result<ControlOutput, ControlError> {
        if command.epoch < self.epoch {
            return Err(ControlError::StaleEpoch { current: self.epoch });
        }
        if self.role == Role::Removed {
            return Err(ControlError::InvalidTransition("node has been removed".to_string()));
        }
        if !self.members.contains_key(&command.target) {
            return Err(ControlError::UnknownTarget(command.target));
        }

        let targets_me = command.target == self.me;
        match command.kind {
            CommandKind::Promote => {
                if let Some((current, promoted_at)) = &self.primary {
                    if *promoted_at == command.epoch && *current != command.target {
                        return Err(ControlError::InvalidTransition(format!(
                            "epoch {:?} already has primary {:?}",
                            command.epoch, current
                        )));
                    }
                }
                if self.role == Role::Uninitialized {
                    self.set_role(Role::Secondary);
                }
                if targets_me {
                    self.set_role(Role::Primary);
                } else {
                    self.set_role(Role::Secondary);
                }
                self.primary = Some((command.target, command.epoch));
            }
            CommandKind::Demote => {
                if targets_me {
                    self.set_role(Role::Secondary);
                } else if self.role == Role::Uninitialized {
                    self.set_role(Role::Secondary);
                }
                if self.primary() == Some(&command.target) {
                    self.primary = None;
                }
            }
            CommandKind::Remove => {
                if targets_me {
                    self.set_role(Role::Removed);
                    self.primary = None;
                } else {
                    self.members.remove(&command.target);
                    if self.primary() == Some(&command.target) {
                        self.primary = None;
                    }
                }
            }
        }

        if command.epoch > self.epoch {
            slog::info!(self.logger, "Epoch {:?} -> {:?}", self.epoch, command.epoch);
            self.epoch = command.epoch;
        }

        Ok(ControlOutput {
            role: self.role,
            epoch: self.epoch,
        })
    }

    fn set_role(&mut self, role: Role) {
        if self.role != role {
            debug_assert!(self.role.can_become(role), "{:?} -> {:?}", self.role, role);
            slog::info!(self.logger, "Role {:?} -> {:?}", self.role, role);
            self.role = role;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn role_manager(me: &str) -> RoleManager {
        let members = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, n)| (id(n), SocketAddr::from(([127, 0, 0, 1], 30000 + i as u16))))
            .collect();
        RoleManager::new(test_logger(), id(me), members)
    }

    #[test]
    fn initial_promotion() {
        let mut a = role_manager("a");
        let mut b = role_manager("b");
        assert_eq!(a.role(), Role::Uninitialized);

        // Steps through Secondary; a direct Uninitialized -> Primary trips the edge check in set_role
        a.apply_command(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        b.apply_command(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();

        assert_eq!(a.role(), Role::Primary);
        assert!(a.primary_lease().is_ok());
        assert_eq!(a.upstream(), None);

        assert_eq!(b.role(), Role::Secondary);
        assert_eq!(b.epoch(), Epoch::initial());
        assert_eq!(b.primary_lease().err(), Some(Some(id("a"))));
        assert_eq!(b.upstream().map(|(p, _)| p), Some(id("a")));
    }

    #[test]
    fn stale_commands_are_rejected() {
        let mut b = role_manager("b");
        b.apply_command(ControlCommand::promote(Epoch::new(3), id("a"))).unwrap();

        let err = b.apply_command(ControlCommand::promote(Epoch::new(2), id("b"))).unwrap_err();
        assert!(matches!(err, ControlError::StaleEpoch { current } if current == Epoch::new(3)));
        assert_eq!(b.role(), Role::Secondary);
    }

    #[test]
    fn second_primary_in_same_epoch_is_rejected() {
        let mut c = role_manager("c");
        c.apply_command(ControlCommand::promote(Epoch::new(2), id("a"))).unwrap();

        let err = c.apply_command(ControlCommand::promote(Epoch::new(2), id("b"))).unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition(_)));

        // A demotion in the same epoch frees the slot.
        c.apply_command(ControlCommand::demote(Epoch::new(2), id("a"))).unwrap();
        c.apply_command(ControlCommand::promote(Epoch::new(2), id("b"))).unwrap();
        assert_eq!(c.primary(), Some(&id("b")));
    }

    #[test]
    fn failover_demotes_old_primary_to_follower() {
        let mut a = role_manager("a");
        a.apply_command(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();

        a.apply_command(ControlCommand::demote(Epoch::new(2), id("a"))).unwrap();
        assert_eq!(a.role(), Role::Secondary);
        assert_eq!(a.primary(), None);
        assert!(a.primary_lease().is_err());

        a.apply_command(ControlCommand::promote(Epoch::new(2), id("b"))).unwrap();
        assert_eq!(a.role(), Role::Secondary);
        assert_eq!(a.upstream().map(|(p, _)| p), Some(id("b")));
    }

    #[test]
    fn removed_is_terminal() {
        let mut a = role_manager("a");
        a.apply_command(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        a.apply_command(ControlCommand::remove(Epoch::new(2), id("a"))).unwrap();
        assert_eq!(a.role(), Role::Removed);

        let err = a.apply_command(ControlCommand::promote(Epoch::new(3), id("a"))).unwrap_err();
        assert!(matches!(err, ControlError::InvalidTransition(_)));
    }

    #[test]
    fn removing_a_peer_drops_it_from_membership() {
        let mut b = role_manager("b");
        b.apply_command(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        b.apply_command(ControlCommand::remove(Epoch::new(2), id("a"))).unwrap();

        assert_eq!(b.primary(), None);
        assert_eq!(b.member_addr(&id("a")), None);
        let err = b.apply_command(ControlCommand::promote(Epoch::new(3), id("a"))).unwrap_err();
        assert!(matches!(err, ControlError::UnknownTarget(_)));
    }

    #[test]
    fn superseded_only_by_newer_tags() {
        let mut a = role_manager("a");
        a.apply_command(ControlCommand::promote(Epoch::new(2), id("a"))).unwrap();

        assert!(!a.is_superseded(None));
        assert!(!a.is_superseded(Some(Epoch::new(1))));
        assert!(!a.is_superseded(Some(Epoch::new(2))));
        assert!(a.is_superseded(Some(Epoch::new(3))));
    }
}
