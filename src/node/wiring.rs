use crate::actor::{self, ActorClient};
use crate::cluster::{ClusterEventPublisher, MemberInfo, NodeId};
use crate::commitlog::InMemoryLog;
use crate::node::node::{Node, NodeConfig};
use crate::node::role_manager::RoleManager;
use crate::oplog::OpLog;
use crate::replication::LinkOptions;
use crate::server::{self, RpcServer};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;

const EVENT_QUEUE_SIZE: usize = 64;

pub(crate) struct NodeSpawnConfig {
    pub(crate) logger: slog::Logger,
    pub(crate) me: NodeId,
    pub(crate) members: Vec<MemberInfo>,
    pub(crate) link_options: LinkOptions,
    pub(crate) events: ClusterEventPublisher,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeCreationError {
    #[error("{0:?} is not in the member list")]
    NotAMember(NodeId),
    #[error("Failed to bind {addr:?}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// NodeHandle keeps a node's actor alive. Dropping it lets the actor exit once in-flight
/// requests drain.
pub(crate) struct NodeHandle {
    id: NodeId,
    addr: SocketAddr,
    actor: ActorClient,
}

impl NodeHandle {
    pub(crate) fn id(&self) -> &NodeId {
        &self.id
    }

    pub(crate) fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop the node without going over the network.
    pub(crate) async fn shutdown_local(&self) {
        // Err means it is already gone.
        let _ = self.actor.shutdown().await;
    }
}

/// Start one node: its operation log, its actor, and its RPC server. The node starts
/// Uninitialized and waits for the cluster controller.
pub(crate) async fn spawn_node(config: NodeSpawnConfig) -> Result<NodeHandle, NodeCreationError> {
    let addr = config
        .members
        .iter()
        .find(|m| m.node_id == config.me.as_str())
        .map(|m| m.socket_addr())
        .ok_or_else(|| NodeCreationError::NotAMember(config.me.clone()))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| NodeCreationError::Bind { addr, source })?;

    let logger = config.logger.new(slog::o!("NodeId" => config.me.to_string()));
    let members = config
        .members
        .iter()
        .map(|m| (NodeId::new(m.node_id.clone()), m.socket_addr()))
        .collect();

    let oplog = OpLog::new(logger.clone(), Box::new(InMemoryLog::new()));
    let (actor_client, actor_queue) = actor::create(EVENT_QUEUE_SIZE);
    let (server_shutdown_handle, server_shutdown_signal) = server::shutdown_signal();

    let node = Node::new(NodeConfig {
        logger: logger.clone(),
        roles: RoleManager::new(logger.clone(), config.me.clone(), members),
        oplog,
        actor_client: actor_client.weak(),
        link_options: config.link_options,
        events: config.events,
        server_shutdown: server_shutdown_handle,
    });
    tokio::spawn(actor_queue.into_actor(node).run_event_loop());

    let server = RpcServer::new(logger, actor_client.weak());
    tokio::spawn(server.run(listener, server_shutdown_signal));

    Ok(NodeHandle {
        id: config.me,
        addr,
        actor: actor_client,
    })
}
