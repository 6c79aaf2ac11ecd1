use crate::actor::WeakActorClient;
use crate::cluster::{ClusterEvent, ClusterEventPublisher, ControlCommand, Epoch, NodeId, Role};
use crate::node::node_api::{
    ApplyError, ApplyInput, ControlError, ControlOutput, LinkReport, NodeStatus, ReadError, ReadInput, ReadOutput,
    RollbackInput, RollbackOutput, StreamError, StreamInput, StreamOutput, WriteError, WriteInput, WriteOutput,
};
use crate::node::read_gate::ReadGate;
use crate::node::role_manager::RoleManager;
use crate::node::write_router::WriteRouter;
use crate::oplog::{ApplyReplicatedError, OpLog, SeqNo};
use crate::replication::{self, LinkConfig, LinkHandle, LinkOptions};
use crate::server::RpcServerShutdownHandle;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub(crate) struct NodeConfig {
    pub(crate) logger: slog::Logger,
    pub(crate) roles: RoleManager,
    pub(crate) oplog: Arc<OpLog>,
    pub(crate) actor_client: WeakActorClient,
    pub(crate) link_options: LinkOptions,
    pub(crate) events: ClusterEventPublisher,
    pub(crate) server_shutdown: RpcServerShutdownHandle,
}

/// Node is one member of the replica set. It is owned by the node actor, so every method here
/// runs one at a time and must not block.
///
/// Background work hangs off `root`:
/// - `primacy` is live only while this node is Primary. Outbound operation streams are children
///   of it, so losing primacy ends them.
/// - `link` is live only while this node is a Secondary with a known primary.
pub(crate) struct Node {
    logger: slog::Logger,
    roles: RoleManager,
    oplog: Arc<OpLog>,
    write_router: WriteRouter,
    root: CancellationToken,
    primacy: Option<(Epoch, CancellationToken)>,
    link: Option<LinkHandle>,
    actor_client: WeakActorClient,
    link_options: LinkOptions,
    events: ClusterEventPublisher,
    server_shutdown: Option<RpcServerShutdownHandle>,
}

impl Node {
    pub(crate) fn new(config: NodeConfig) -> Self {
        Node {
            write_router: WriteRouter::new(config.logger.clone()),
            logger: config.logger,
            roles: config.roles,
            oplog: config.oplog,
            root: CancellationToken::new(),
            primacy: None,
            link: None,
            actor_client: config.actor_client,
            link_options: config.link_options,
            events: config.events,
            server_shutdown: Some(config.server_shutdown),
        }
    }

    pub(crate) fn handle_write(&mut self, input: WriteInput) -> Result<WriteOutput, WriteError> {
        self.write_router.write(&self.roles, &self.oplog, input)
    }

    pub(crate) fn handle_read(&mut self, input: ReadInput) -> Result<ReadOutput, ReadError> {
        ReadGate::read(self.roles.role(), &self.oplog, input)
    }

    pub(crate) fn handle_status(&self) -> NodeStatus {
        NodeStatus {
            node_id: self.roles.me().clone(),
            role: self.roles.role(),
            epoch: self.roles.epoch(),
            primary: self.roles.primary().cloned(),
            last_seq: self.oplog.last_seq(),
        }
    }

    pub(crate) fn handle_control(&mut self, command: ControlCommand) -> Result<ControlOutput, ControlError> {
        slog::info!(self.logger, "Applying {:?}", command);
        let output = self.roles.apply_command(command)?;
        self.reconcile_tasks();

        Ok(output)
    }

    pub(crate) fn handle_open_stream(&mut self, input: StreamInput) -> Result<StreamOutput, StreamError> {
        let not_primary = |roles: &RoleManager| StreamError::NotPrimary {
            primary: roles.primary().cloned(),
        };
        if self.roles.primary_lease().is_err() {
            return Err(not_primary(&self.roles));
        }
        let primacy = match &self.primacy {
            Some((_, token)) => token.child_token(),
            None => return Err(not_primary(&self.roles)),
        };

        let epoch = self.roles.epoch();
        if input.epoch > epoch {
            return Err(StreamError::StaleEpoch { current: epoch });
        }

        let from = match input.after {
            None => SeqNo::new(1),
            Some((after_seq, after_epoch)) => {
                if self.oplog.epoch_at(after_seq)? != Some(after_epoch) {
                    slog::info!(
                        self.logger,
                        "{:?}'s log diverges at {:?} (epoch {:?})",
                        input.requester,
                        after_seq,
                        after_epoch
                    );
                    return Err(StreamError::SequenceGap {
                        primary_last: self.oplog.last_seq(),
                    });
                }
                after_seq.next()
            }
        };

        slog::info!(self.logger, "Streaming to {:?} from {:?}", input.requester, from);
        Ok(StreamOutput {
            epoch,
            reader: self.oplog.read_from(from, primacy),
        })
    }

    pub(crate) fn handle_apply_replicated(&mut self, input: ApplyInput) -> Result<(), ApplyError> {
        let current = self.roles.epoch();
        if input.stream_epoch < current {
            return Err(ApplyError::StaleEpoch { current });
        }
        self.check_following(&input.source)?;

        self.oplog.apply_replicated(&input.op).map_err(|e| match e {
            ApplyReplicatedError::SequenceGap { expected, received } => ApplyError::SequenceGap { expected, received },
            ApplyReplicatedError::Io(e) => ApplyError::LocalIoError(e),
        })
    }

    pub(crate) fn handle_rollback(&mut self, input: RollbackInput) -> Result<RollbackOutput, ApplyError> {
        self.check_following(&input.source)?;

        let dropped = self.oplog.truncate_after(input.to)?;
        Ok(RollbackOutput {
            last_seq: self.oplog.last_seq(),
            dropped,
        })
    }

    pub(crate) fn handle_link_report(&mut self, report: LinkReport) {
        let reporter = self.roles.me().clone();
        let event = match report {
            LinkReport::Unreachable {
                peer,
                consecutive_failures,
            } => ClusterEvent::LinkUnreachable {
                reporter,
                peer,
                consecutive_failures,
            },
            LinkReport::Recovered { peer } => ClusterEvent::LinkRecovered { reporter, peer },
        };

        self.events.publish(&self.logger, event);
    }

    pub(crate) fn handle_shutdown(&mut self) {
        slog::info!(self.logger, "Shutting down");
        self.root.cancel();
        self.primacy = None;
        self.link = None;
        self.oplog.close();
        // Dropping the handle stops the RPC server.
        self.server_shutdown = None;
    }

    // Only the link we'd start right now may apply to our log.
    fn check_following(&self, source: &NodeId) -> Result<(), ApplyError> {
        match self.roles.upstream() {
            Some((primary, _)) if &primary == source => Ok(()),
            _ => Err(ApplyError::NotFollowing),
        }
    }

    fn reconcile_tasks(&mut self) {
        let epoch = self.roles.epoch();

        if self.roles.role() == Role::Primary {
            let current = matches!(&self.primacy, Some((e, _)) if *e == epoch);
            if !current {
                if let Some((_, old)) = self.primacy.take() {
                    old.cancel();
                }
                self.primacy = Some((epoch, self.root.child_token()));
            }
        } else if let Some((_, old)) = self.primacy.take() {
            old.cancel();
        }

        match self.roles.upstream() {
            Some((peer, peer_addr)) => {
                let current = matches!(&self.link, Some(link) if link.peer() == &peer && link.epoch() == epoch);
                if !current {
                    // Drop the old link before starting its replacement.
                    self.link = None;
                    self.link = Some(replication::spawn_link(
                        LinkConfig {
                            logger: self.logger.clone(),
                            me: self.roles.me().clone(),
                            peer,
                            peer_addr,
                            epoch,
                            oplog: self.oplog.clone(),
                            node: self.actor_client.clone(),
                            options: self.link_options.clone(),
                        },
                        self.root.child_token(),
                    ));
                }
            }
            None => self.link = None,
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        // Ends the link and outbound streams even if the actor exits without a shutdown event.
        self.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor;
    use crate::cluster;
    use crate::commitlog::InMemoryLog;
    use crate::node::document::Document;
    use crate::oplog::Operation;
    use crate::server;
    use bytes::Bytes;
    use serde_json::{json, Map};
    use std::net::SocketAddr;
    use tokio::time::Duration;

    fn test_logger() -> slog::Logger {
        slog::Logger::root(slog::Discard, slog::o!())
    }

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn create_node(me: &str) -> Node {
        let members = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, n)| (id(n), SocketAddr::from(([127, 0, 0, 1], 1 + i as u16))))
            .collect();
        let (actor_client, _queue) = actor::create(8);
        let (events, _stream) = cluster::event_channel();
        let (server_shutdown, _signal) = server::shutdown_signal();

        Node::new(NodeConfig {
            logger: test_logger(),
            roles: RoleManager::new(test_logger(), id(me), members),
            oplog: OpLog::new(test_logger(), Box::new(InMemoryLog::new())),
            actor_client: actor_client.weak(),
            link_options: LinkOptions {
                initial_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(1),
                unreachable_after: 5,
                rpc_timeout: Duration::from_millis(100),
            },
            events,
            server_shutdown,
        })
    }

    fn write(node: &mut Node, count: u64) -> SeqNo {
        let mut body = Map::new();
        body.insert("count".to_string(), json!(count));
        let input = WriteInput {
            document: Document::new("coll", body),
            epoch: None,
        };
        node.handle_write(input).unwrap().seq
    }

    fn op(seq: u64, epoch: u64) -> Operation {
        Operation::from_parts(SeqNo::new(seq), Epoch::new(epoch), 0, Bytes::from_static(b"{}")).unwrap()
    }

    fn apply(source: &str, stream_epoch: u64, op: Operation) -> ApplyInput {
        ApplyInput {
            source: id(source),
            stream_epoch: Epoch::new(stream_epoch),
            op,
        }
    }

    fn stream_input(epoch: u64, after: Option<(u64, u64)>) -> StreamInput {
        StreamInput {
            requester: id("b"),
            epoch: Epoch::new(epoch),
            after: after.map(|(seq, epoch)| (SeqNo::new(seq), Epoch::new(epoch))),
        }
    }

    #[tokio::test]
    async fn replicated_ops_from_older_stream_epoch_are_stale() {
        let mut node = create_node("b");
        node.handle_control(ControlCommand::promote(Epoch::new(2), id("a"))).unwrap();

        match node.handle_apply_replicated(apply("a", 1, op(1, 1))) {
            Err(ApplyError::StaleEpoch { current }) => assert_eq!(current, Epoch::new(2)),
            other => panic!("Expected StaleEpoch, got {:?}", other),
        }
        assert_eq!(node.oplog.last_seq(), SeqNo::ZERO);

        node.handle_apply_replicated(apply("a", 2, op(1, 1))).unwrap();
        assert_eq!(node.oplog.last_seq(), SeqNo::new(1));
    }

    #[tokio::test]
    async fn replicated_ops_only_from_upstream() {
        let mut node = create_node("b");
        node.handle_control(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();

        assert!(matches!(
            node.handle_apply_replicated(apply("c", 1, op(1, 1))),
            Err(ApplyError::NotFollowing)
        ));
        assert!(matches!(
            node.handle_rollback(RollbackInput {
                source: id("c"),
                to: SeqNo::ZERO,
            }),
            Err(ApplyError::NotFollowing)
        ));

        // Primary doesn't follow anyone
        let mut primary = create_node("a");
        primary.handle_control(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        assert!(matches!(
            primary.handle_apply_replicated(apply("a", 1, op(1, 1))),
            Err(ApplyError::NotFollowing)
        ));
    }

    #[tokio::test]
    async fn replicated_ops_must_be_contiguous() {
        let mut node = create_node("b");
        node.handle_control(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        node.handle_apply_replicated(apply("a", 1, op(1, 1))).unwrap();

        match node.handle_apply_replicated(apply("a", 1, op(3, 1))) {
            Err(ApplyError::SequenceGap { expected, received }) => {
                assert_eq!(expected, SeqNo::new(2));
                assert_eq!(received, SeqNo::new(3));
            }
            other => panic!("Expected SequenceGap, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rollback_from_upstream_truncates_suffix() {
        let mut node = create_node("b");
        node.handle_control(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        for seq in 1..=4 {
            node.handle_apply_replicated(apply("a", 1, op(seq, 1))).unwrap();
        }

        let output = node
            .handle_rollback(RollbackInput {
                source: id("a"),
                to: SeqNo::new(2),
            })
            .unwrap();
        assert_eq!(output.last_seq, SeqNo::new(2));
        assert_eq!(output.dropped, 2);
        assert_eq!(node.oplog.last_seq(), SeqNo::new(2));
    }

    #[tokio::test]
    async fn open_stream_checks_role_epoch_and_prefix() {
        let mut secondary = create_node("b");
        secondary.handle_control(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        match secondary.handle_open_stream(stream_input(1, None)) {
            Err(StreamError::NotPrimary { primary }) => assert_eq!(primary, Some(id("a"))),
            other => panic!("Expected NotPrimary, got {:?}", other),
        }

        let mut node = create_node("a");
        node.handle_control(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        for i in 1..=3 {
            write(&mut node, i);
        }

        // Requester has seen a newer epoch than we have
        match node.handle_open_stream(stream_input(2, None)) {
            Err(StreamError::StaleEpoch { current }) => assert_eq!(current, Epoch::initial()),
            other => panic!("Expected StaleEpoch, got {:?}", other),
        }

        // Same seq, different epoch: divergent
        match node.handle_open_stream(stream_input(1, Some((3, 7)))) {
            Err(StreamError::SequenceGap { primary_last }) => assert_eq!(primary_last, SeqNo::new(3)),
            other => panic!("Expected SequenceGap, got {:?}", other),
        }
        // Requester is ahead of us
        match node.handle_open_stream(stream_input(1, Some((5, 1)))) {
            Err(StreamError::SequenceGap { primary_last }) => assert_eq!(primary_last, SeqNo::new(3)),
            other => panic!("Expected SequenceGap, got {:?}", other),
        }

        let output = node.handle_open_stream(stream_input(1, Some((2, 1)))).unwrap();
        assert_eq!(output.epoch, Epoch::initial());
        assert_eq!(output.reader.position(), SeqNo::new(3));

        let output = node.handle_open_stream(stream_input(1, None)).unwrap();
        assert_eq!(output.reader.position(), SeqNo::new(1));
    }

    #[tokio::test]
    async fn losing_primacy_ends_outbound_streams() {
        let mut node = create_node("a");
        node.handle_control(ControlCommand::promote(Epoch::initial(), id("a"))).unwrap();
        write(&mut node, 1);

        let mut reader = node.handle_open_stream(stream_input(1, None)).unwrap().reader;
        assert_eq!(reader.next().await.unwrap().map(|op| op.seq), Some(SeqNo::new(1)));

        node.handle_control(ControlCommand::demote(Epoch::new(2), id("a"))).unwrap();
        assert!(reader.next().await.unwrap().is_none());
    }
}
