use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// NodeId identifies a member of the replica set. It is unique within a cluster.
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(String);

impl NodeId {
    pub fn new<S: Into<String>>(id: S) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::new(id)
    }
}

/// Epoch identifies a primacy period. It only ever moves forward, and the cluster controller
/// bumps it on every role change. Epoch 0 means "never initialized".
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn new(epoch: u64) -> Self {
        Epoch(epoch)
    }

    /// The epoch a freshly initiated replica set starts at.
    pub fn initial() -> Self {
        Epoch(1)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(&self) -> Epoch {
        Epoch(self.0 + 1)
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a single node.
///
/// ```text
/// Uninitialized -> Secondary <-> Primary
///       \              \           /
///        +--------------+-> Removed (terminal)
/// ```
///
/// The initial primary is no exception: its first promotion walks through Secondary.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Role {
    Uninitialized,
    Secondary,
    Primary,
    Removed,
}

impl Role {
    /// Whether the diagram above has an edge from `self` to `next`.
    pub fn can_become(self, next: Role) -> bool {
        matches!(
            (self, next),
            (Role::Uninitialized, Role::Secondary)
                | (Role::Uninitialized, Role::Removed)
                | (Role::Secondary, Role::Primary)
                | (Role::Secondary, Role::Removed)
                | (Role::Primary, Role::Secondary)
                | (Role::Primary, Role::Removed)
        )
    }
}

/// Address book entry for a member of the replica set.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MemberInfo {
    pub node_id: String,
    pub ip_addr: Ipv4Addr,
    pub port: u16,
}

impl MemberInfo {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.ip_addr, self.port))
    }
}

/// PrimaryLease is proof that this node was Primary at `epoch` when the lease was handed out.
/// Only the role manager can mint one, so holding a lease is the only way to append to the
/// operation log as a writer.
#[derive(Debug)]
pub(crate) struct PrimaryLease {
    epoch: Epoch,
}

impl PrimaryLease {
    pub(crate) fn new(epoch: Epoch) -> Self {
        PrimaryLease { epoch }
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }
}
