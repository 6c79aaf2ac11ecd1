use crate::client::{ClientError, NodeClient};
use crate::cluster::{self, ClusterEvent, ClusterEventStream, ClusterView, ControlCommand, Epoch, MemberInfo, NodeId, Role};
use crate::controller::options::{ReplSetOptions, ReplSetOptionsValidated};
use crate::node::{self, NodeCreationError, NodeHandle, NodeSpawnConfig};
use std::collections::{BTreeMap, HashSet};
use std::convert::TryFrom;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio::time::Duration;

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(50);

pub struct ClusterConfig {
    pub logger: slog::Logger,
    pub members: Vec<MemberInfo>,
    pub initial_primary: String,
    pub options: ReplSetOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Invalid options: {0}")]
    InvalidOptions(&'static str),
    #[error("Invalid cluster config: {0}")]
    InvalidConfig(String),
    #[error("Failed to start node")]
    NodeCreation(#[from] NodeCreationError),
    #[error("Unknown node {0:?}")]
    UnknownNode(NodeId),
    #[error("Node {0:?} has been removed from the replica set")]
    NodeRemoved(NodeId),
    #[error("Node {node:?} is unreachable")]
    Unreachable {
        node: NodeId,
        #[source]
        source: ClientError,
    },
    #[error("Node {node:?} rejected the command")]
    Rejected {
        node: NodeId,
        #[source]
        source: ClientError,
    },
    #[error("Failed to promote {target:?}; the replica set has no primary")]
    PromotionFailed {
        target: NodeId,
        #[source]
        source: ClientError,
    },
}

/// ClusterController starts a replica set and changes its roles. It is the only thing that
/// issues control commands, and the `ClusterView` it owns is the record of who is primary.
///
/// Every operation holds the state lock for its whole duration, so failovers never interleave.
pub struct ClusterController {
    inner: Arc<Mutex<ControllerState>>,
}

impl ClusterController {
    /// Start every member, then promote `initial_primary` at the initial epoch.
    pub async fn start(config: ClusterConfig) -> Result<Self, ControllerError> {
        let options = ReplSetOptionsValidated::try_from(config.options).map_err(ControllerError::InvalidOptions)?;
        validate_members(&config.members, &config.initial_primary)?;

        let logger = config.logger.new(slog::o!("Component" => "Controller"));
        let (events, event_stream) = cluster::event_channel();

        let mut handles = BTreeMap::new();
        for member in &config.members {
            let handle = node::spawn_node(NodeSpawnConfig {
                logger: config.logger.clone(),
                me: NodeId::new(member.node_id.clone()),
                members: config.members.clone(),
                link_options: options.link_options(),
                events: events.clone(),
            })
            .await?;
            handles.insert(handle.id().clone(), handle);
        }
        // Nodes hold the only publishers now. The event stream ends when the last node does.
        drop(events);

        let mut clients = BTreeMap::new();
        for (id, handle) in &handles {
            let client = connect_with_retry(&logger, handle.addr(), options.rpc_timeout)
                .await
                .map_err(|source| ControllerError::Unreachable {
                    node: id.clone(),
                    source,
                })?;
            clients.insert(id.clone(), client);
        }

        let mut state = ControllerState {
            logger: logger.clone(),
            view: ClusterView::new(&config.members),
            clients,
            handles,
            options,
        };

        let primary = NodeId::new(config.initial_primary);
        let epoch = Epoch::initial();
        let command = ControlCommand::promote(epoch, primary.clone());
        state.send(&primary, &command).await?;
        for id in state.view.live_node_ids() {
            if id != primary {
                state.send(&id, &command).await?;
            }
        }
        state.view.record_promotion(&primary, epoch);
        slog::info!(logger, "Replica set initiated. Primary {:?} at epoch {:?}", primary, epoch);

        let inner = Arc::new(Mutex::new(state));
        tokio::spawn(monitor(logger, Arc::downgrade(&inner), event_stream));

        Ok(ClusterController { inner })
    }

    /// Snapshot of the controller's view.
    pub async fn view(&self) -> ClusterView {
        self.inner.lock().await.view.clone()
    }

    /// Poll every node's status and record how far each log goes.
    pub async fn refresh(&self) -> ClusterView {
        let mut state = self.inner.lock().await;
        state.refresh().await;
        state.view.clone()
    }

    /// Make `target` the primary at a new epoch.
    ///
    /// The old primary is demoted to Secondary if it still answers, or removed from the set if it
    /// doesn't. Every remaining member then follows `target`. Returns the new epoch.
    pub async fn manual_failover(&self, target: &NodeId) -> Result<Epoch, ControllerError> {
        self.inner.lock().await.failover(target).await
    }

    /// Take one node down, like `adminCommand({shutdown: 1})`. Nobody is promoted in its place
    /// unless automatic failover is on. Shutting down a member that is already down is a no-op.
    pub async fn shutdown(&self, node: &NodeId) -> Result<(), ControllerError> {
        self.inner.lock().await.shutdown(node).await
    }

    /// Stop every node.
    pub async fn stop(&self) {
        let mut state = self.inner.lock().await;
        let ids: Vec<NodeId> = state.handles.keys().cloned().collect();
        for id in ids {
            if let Some(handle) = state.handles.remove(&id) {
                handle.shutdown_local().await;
            }
            state.clients.remove(&id);
            state.view.set_reachable(&id, false);
        }
        slog::info!(state.logger, "Replica set stopped");
    }
}

struct ControllerState {
    logger: slog::Logger,
    view: ClusterView,
    clients: BTreeMap<NodeId, NodeClient>,
    handles: BTreeMap<NodeId, NodeHandle>,
    options: ReplSetOptionsValidated,
}

impl ControllerState {
    async fn send(&self, node: &NodeId, command: &ControlCommand) -> Result<(Role, Epoch), ControllerError> {
        let client = self.clients.get(node).ok_or_else(|| ControllerError::Unreachable {
            node: node.clone(),
            source: ClientError::MalformedResponse("no connection"),
        })?;

        client.control(command).await.map_err(|source| {
            if source.is_unreachable() {
                ControllerError::Unreachable {
                    node: node.clone(),
                    source,
                }
            } else {
                ControllerError::Rejected {
                    node: node.clone(),
                    source,
                }
            }
        })
    }

    /// Send `command` to every live member except `skip`. Members that don't answer are marked
    /// unreachable; the command still counts as delivered to the rest.
    async fn broadcast(&mut self, command: &ControlCommand, skip: Option<&NodeId>) {
        for id in self.view.live_node_ids() {
            if Some(&id) == skip {
                continue;
            }
            match self.send(&id, command).await {
                Ok(_) => {}
                Err(ControllerError::Unreachable { .. }) => {
                    slog::warn!(self.logger, "{:?} unreachable while sending {:?}", id, command);
                    self.view.set_reachable(&id, false);
                }
                Err(e) => slog::warn!(self.logger, "{:?} rejected {:?}: {}", id, command, e),
            }
        }
    }

    async fn failover(&mut self, target: &NodeId) -> Result<Epoch, ControllerError> {
        match self.view.node(target) {
            None => return Err(ControllerError::UnknownNode(target.clone())),
            Some(record) if record.role == Role::Removed => return Err(ControllerError::NodeRemoved(target.clone())),
            Some(_) => {}
        }
        self.probe(target).await?;

        let new_epoch = self.view.epoch().next();
        slog::info!(self.logger, "Failing over to {:?} at epoch {:?}", target, new_epoch);

        if let Some(old) = self.view.primary().cloned() {
            if &old != target {
                self.retire(&old, new_epoch).await?;
            }
        }

        let promote = ControlCommand::promote(new_epoch, target.clone());
        if let Err(e) = self.send(target, &promote).await {
            self.view.record_primary_loss(new_epoch, Role::Secondary);
            let source = match e {
                ControllerError::Unreachable { source, .. } | ControllerError::Rejected { source, .. } => source,
                e => return Err(e),
            };
            return Err(ControllerError::PromotionFailed {
                target: target.clone(),
                source,
            });
        }
        self.broadcast(&promote, Some(target)).await;
        self.view.record_promotion(target, new_epoch);

        slog::info!(self.logger, "{:?} is primary at epoch {:?}", target, new_epoch);
        Ok(new_epoch)
    }

    // Take the old primary out of the way: demote it if it answers, remove it if not.
    async fn retire(&mut self, old: &NodeId, epoch: Epoch) -> Result<(), ControllerError> {
        let demote = ControlCommand::demote(epoch, old.clone());
        match self.send(old, &demote).await {
            Ok(_) => {
                slog::info!(self.logger, "Demoted {:?}", old);
                self.broadcast(&demote, Some(old)).await;
                self.view.record_primary_loss(epoch, Role::Secondary);
                Ok(())
            }
            Err(ControllerError::Unreachable { .. }) => {
                slog::warn!(self.logger, "Old primary {:?} is down. Removing it from the replica set.", old);
                self.view.set_reachable(old, false);
                self.broadcast(&ControlCommand::remove(epoch, old.clone()), None).await;
                self.view.record_primary_loss(epoch, Role::Removed);
                self.view.mark_removed(old);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn probe(&mut self, node: &NodeId) -> Result<(), ControllerError> {
        let client = match self.clients.get(node) {
            Some(client) => client.clone(),
            None => {
                return Err(ControllerError::Unreachable {
                    node: node.clone(),
                    source: ClientError::MalformedResponse("no connection"),
                })
            }
        };

        match client.status().await {
            Ok(status) => {
                self.view.set_reachable(node, true);
                self.view.set_last_applied(node, status.last_seq);
                Ok(())
            }
            Err(source) => {
                self.view.set_reachable(node, false);
                Err(ControllerError::Unreachable {
                    node: node.clone(),
                    source,
                })
            }
        }
    }

    async fn shutdown(&mut self, node: &NodeId) -> Result<(), ControllerError> {
        if self.view.node(node).is_none() {
            return Err(ControllerError::UnknownNode(node.clone()));
        }
        let client = match self.clients.get(node) {
            Some(client) => client.clone(),
            None => {
                slog::debug!(self.logger, "{:?} is already down", node);
                return Ok(());
            }
        };

        match client.shutdown().await {
            Ok(()) => slog::info!(self.logger, "{:?} shut down", node),
            Err(e) if e.is_unreachable() => slog::warn!(self.logger, "{:?} did not answer shutdown: {}", node, e),
            Err(e) => {
                return Err(ControllerError::Rejected {
                    node: node.clone(),
                    source: e,
                })
            }
        }

        // Make sure it's down even if the RPC got lost.
        if let Some(handle) = self.handles.remove(node) {
            handle.shutdown_local().await;
        }
        self.clients.remove(node);
        self.view.set_reachable(node, false);

        Ok(())
    }

    async fn refresh(&mut self) {
        let ids: Vec<NodeId> = self.clients.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.probe(&id).await {
                slog::info!(self.logger, "{}", e);
            }
        }
    }

    async fn handle_event(&mut self, event: ClusterEvent) {
        match event {
            ClusterEvent::LinkUnreachable {
                reporter,
                peer,
                consecutive_failures,
            } => {
                slog::warn!(
                    self.logger,
                    "{:?} can't reach {:?} ({} consecutive failures)",
                    reporter,
                    peer,
                    consecutive_failures
                );
                if self.probe(&peer).await.is_ok() {
                    slog::info!(self.logger, "{:?} still answers the controller", peer);
                    return;
                }

                if self.view.primary() == Some(&peer) && self.options.automatic_failover {
                    self.failover_automatically().await;
                }
            }
            ClusterEvent::LinkRecovered { reporter, peer } => {
                slog::info!(self.logger, "{:?} reaches {:?} again", reporter, peer);
                if self.clients.contains_key(&peer) {
                    self.view.set_reachable(&peer, true);
                }
            }
        }
    }

    async fn failover_automatically(&mut self) {
        self.refresh().await;

        let target = match self.view.most_caught_up_secondary() {
            Some(target) => target,
            None => {
                slog::warn!(self.logger, "Primary lost and no secondary is eligible for promotion");
                return;
            }
        };

        match self.failover(&target).await {
            Ok(epoch) => slog::info!(self.logger, "Automatic failover to {:?} at epoch {:?}", target, epoch),
            Err(e) => slog::warn!(self.logger, "Automatic failover to {:?} failed: {}", target, e),
        }
    }
}

async fn monitor(logger: slog::Logger, state: Weak<Mutex<ControllerState>>, mut events: ClusterEventStream) {
    while let Some(event) = events.recv().await {
        let state = match state.upgrade() {
            Some(state) => state,
            None => break,
        };
        state.lock().await.handle_event(event).await;
    }

    slog::debug!(logger, "Cluster monitor exited");
}

async fn connect_with_retry(
    logger: &slog::Logger,
    addr: std::net::SocketAddr,
    rpc_timeout: Duration,
) -> Result<NodeClient, ClientError> {
    let mut attempt = 1;
    loop {
        match NodeClient::connect(addr, rpc_timeout).await {
            Ok(client) => return Ok(client),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                slog::debug!(logger, "Connect to {:?} failed (attempt {}): {}", addr, attempt, e);
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn validate_members(members: &[MemberInfo], initial_primary: &str) -> Result<(), ControllerError> {
    if members.is_empty() {
        return Err(ControllerError::InvalidConfig("no members".to_string()));
    }

    let mut ids = HashSet::new();
    let mut addrs = HashSet::new();
    for m in members {
        if !ids.insert(m.node_id.as_str()) {
            return Err(ControllerError::InvalidConfig(format!("duplicate node id {}", m.node_id)));
        }
        if !addrs.insert(m.socket_addr()) {
            return Err(ControllerError::InvalidConfig(format!("duplicate address {}", m.socket_addr())));
        }
    }
    if !ids.contains(initial_primary) {
        return Err(ControllerError::InvalidConfig(format!(
            "initial primary {} is not a member",
            initial_primary
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn member(id: &str, port: u16) -> MemberInfo {
        MemberInfo {
            node_id: id.to_string(),
            ip_addr: Ipv4Addr::LOCALHOST,
            port,
        }
    }

    #[test]
    fn member_validation() {
        assert!(validate_members(&[], "a").is_err());
        assert!(validate_members(&[member("a", 1), member("a", 2)], "a").is_err());
        assert!(validate_members(&[member("a", 1), member("b", 1)], "a").is_err());
        assert!(validate_members(&[member("a", 1), member("b", 2)], "c").is_err());
        assert!(validate_members(&[member("a", 1), member("b", 2)], "b").is_ok());
    }
}
