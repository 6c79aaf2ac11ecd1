use crate::actor::WeakActorClient;
use crate::client::{ClientError, NodeClient};
use crate::cluster::{Epoch, NodeId};
use crate::grpc::ProtoStreamMsg;
use crate::node::{ApplyError, ApplyInput, LinkReport, RollbackInput};
use crate::oplog::{OpLog, Operation, SeqNo};
use crate::replication::backoff::Backoff;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::Streaming;

#[derive(Clone, Debug)]
pub(crate) struct LinkOptions {
    pub(crate) initial_backoff: Duration,
    pub(crate) max_backoff: Duration,
    pub(crate) unreachable_after: u32,
    pub(crate) rpc_timeout: Duration,
}

pub(crate) struct LinkConfig {
    pub(crate) logger: slog::Logger,
    pub(crate) me: NodeId,
    pub(crate) peer: NodeId,
    pub(crate) peer_addr: SocketAddr,
    pub(crate) epoch: Epoch,
    pub(crate) oplog: Arc<OpLog>,
    pub(crate) node: WeakActorClient,
    pub(crate) options: LinkOptions,
}

/// LinkHandle keeps a running replication link alive. Dropping it stops the link.
pub(crate) struct LinkHandle {
    peer: NodeId,
    epoch: Epoch,
    _guard: DropGuard,
}

impl LinkHandle {
    pub(crate) fn peer(&self) -> &NodeId {
        &self.peer
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum LinkError {
    #[error("Link broken: {0}")]
    Broken(String),
    #[error("Upstream is behind our epoch {current:?}")]
    StaleEpoch { current: Epoch },
    #[error("Local log diverges from upstream, whose log ends at {primary_last:?}")]
    Diverged { primary_last: SeqNo },
    #[error("Sequence gap: expected {expected:?}, received {received:?}")]
    SequenceGap { expected: SeqNo, received: SeqNo },
    #[error("Rollback failed: {0}")]
    RollbackFailed(String),
    #[error("No longer following upstream")]
    Superseded,
    #[error("Node actor has exited")]
    NodeExited,
}

impl From<ClientError> for LinkError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::StaleEpoch { current } => LinkError::StaleEpoch { current },
            ClientError::SequenceGap { primary_last } => LinkError::Diverged { primary_last },
            // Includes NotPrimary: during a failover we may hear about the new primary before it does.
            e => LinkError::Broken(e.to_string()),
        }
    }
}

pub(crate) fn spawn_link(config: LinkConfig, cancel: CancellationToken) -> LinkHandle {
    let handle = LinkHandle {
        peer: config.peer.clone(),
        epoch: config.epoch,
        _guard: cancel.clone().drop_guard(),
    };

    let link = ReplicationLink {
        logger: config.logger.new(slog::o!("Peer" => config.peer.to_string())),
        me: config.me,
        peer: config.peer,
        peer_addr: config.peer_addr,
        epoch: config.epoch,
        oplog: config.oplog,
        node: config.node,
        options: config.options,
        cancel,
        client: None,
    };
    tokio::spawn(link.run());

    handle
}

/// ReplicationLink pulls the primary's operation log into this node's log, in order.
///
/// It is a pull: each (re)connect asks the primary for everything after our newest operation,
/// then applies what arrives through the node actor, which re-checks epoch and order.
struct ReplicationLink {
    logger: slog::Logger,
    me: NodeId,
    peer: NodeId,
    peer_addr: SocketAddr,
    epoch: Epoch,
    oplog: Arc<OpLog>,
    node: WeakActorClient,
    options: LinkOptions,
    cancel: CancellationToken,
    client: Option<NodeClient>,
}

impl ReplicationLink {
    async fn run(mut self) {
        slog::info!(self.logger, "Replication link starting at epoch {:?}", self.epoch);

        let cancel = self.cancel.clone();
        let mut backoff = Backoff::new(self.options.initial_backoff, self.options.max_backoff);
        let mut consecutive_failures = 0u32;

        loop {
            let opened = tokio::select! {
                result = self.open() => result,
                _ = cancel.cancelled() => break,
            };

            let err = match opened {
                Ok(stream) => {
                    if consecutive_failures >= self.options.unreachable_after {
                        let report = LinkReport::Recovered { peer: self.peer.clone() };
                        if self.node.link_report(report).await.is_err() {
                            break;
                        }
                    }
                    consecutive_failures = 0;

                    tokio::select! {
                        err = self.pump(stream, &mut backoff) => err,
                        _ = cancel.cancelled() => break,
                    }
                }
                Err(e) => e,
            };

            let err = match err {
                // Rolled back: reconnect right away, the next open checks the new position.
                LinkError::Diverged { primary_last } => match self.resync(primary_last).await {
                    Ok(()) => continue,
                    Err(e) => e,
                },
                err => err,
            };

            let delay = match retry_delay(&err, &mut backoff) {
                Some(delay) => delay,
                None => {
                    slog::warn!(self.logger, "Replication link giving up: {}", err);
                    break;
                }
            };

            if let LinkError::Broken(_) = err {
                consecutive_failures += 1;
                self.client = None;
                slog::info!(
                    self.logger,
                    "{} ({} consecutive failure(s))",
                    err,
                    consecutive_failures
                );

                if consecutive_failures == self.options.unreachable_after {
                    slog::warn!(self.logger, "Upstream is unreachable");
                    let report = LinkReport::Unreachable {
                        peer: self.peer.clone(),
                        consecutive_failures,
                    };
                    if self.node.link_report(report).await.is_err() {
                        break;
                    }
                }
            } else {
                slog::warn!(self.logger, "{}. Reconnecting in {:?}.", err, delay);
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => break,
            }
        }

        slog::info!(self.logger, "Replication link stopped");
    }

    async fn open(&mut self) -> Result<Streaming<ProtoStreamMsg>, LinkError> {
        let client = match &self.client {
            Some(client) => client.clone(),
            None => {
                let client = NodeClient::connect(self.peer_addr, self.options.rpc_timeout).await?;
                self.client = Some(client.clone());
                client
            }
        };

        let after = self
            .oplog
            .last_entry()
            .map_err(|e| LinkError::Broken(format!("local log read failed: {}", e)))?;

        Ok(client.stream_operations(&self.me, self.epoch, after).await?)
    }

    /// Apply operations until the stream ends. Progress resets the backoff.
    async fn pump(&self, mut stream: Streaming<ProtoStreamMsg>, backoff: &mut Backoff) -> LinkError {
        loop {
            let msg = match stream.message().await {
                Ok(Some(msg)) => msg,
                Ok(None) => return LinkError::Broken("stream ended by upstream".to_string()),
                Err(status) => return LinkError::Broken(status.to_string()),
            };

            let op = match Operation::from_parts(
                SeqNo::new(msg.sequence_number),
                Epoch::new(msg.op_epoch),
                msg.timestamp_millis,
                Bytes::from(msg.payload),
            ) {
                Ok(op) => op,
                Err(e) => return LinkError::Broken(format!("malformed operation: {}", e)),
            };

            let input = ApplyInput {
                source: self.peer.clone(),
                stream_epoch: Epoch::new(msg.epoch),
                op,
            };
            match self.node.apply_replicated(input).await {
                Ok(()) => backoff.reset(),
                Err(ApplyError::StaleEpoch { current }) => return LinkError::StaleEpoch { current },
                Err(ApplyError::NotFollowing) => return LinkError::Superseded,
                Err(ApplyError::SequenceGap { expected, received }) => {
                    return LinkError::SequenceGap { expected, received }
                }
                Err(ApplyError::LocalIoError(e)) => return LinkError::Broken(format!("local log write failed: {}", e)),
                Err(ApplyError::ActorExited) => return LinkError::NodeExited,
            }
        }
    }

    async fn resync(&self, primary_last: SeqNo) -> Result<(), LinkError> {
        let local_last = self.oplog.last_seq();
        let to = rollback_target(local_last, primary_last);
        slog::warn!(
            self.logger,
            "Log diverges from upstream (local last {:?}, upstream last {:?}). Rolling back to {:?}.",
            local_last,
            primary_last,
            to
        );

        let input = RollbackInput {
            source: self.peer.clone(),
            to,
        };
        match self.node.rollback(input).await {
            Ok(output) => {
                slog::info!(
                    self.logger,
                    "Rolled back {} operation(s); resuming after {:?}",
                    output.dropped,
                    output.last_seq
                );
                Ok(())
            }
            Err(ApplyError::NotFollowing) => Err(LinkError::Superseded),
            Err(ApplyError::ActorExited) => Err(LinkError::NodeExited),
            Err(e) => Err(LinkError::RollbackFailed(e.to_string())),
        }
    }
}

/// How long to wait before reopening the stream after `err`, or `None` if following this upstream
/// can't make progress any more. Every retry waits out the backoff, whatever ended the stream.
fn retry_delay(err: &LinkError, backoff: &mut Backoff) -> Option<Duration> {
    match err {
        LinkError::StaleEpoch { .. } | LinkError::Superseded | LinkError::NodeExited => None,
        LinkError::Broken(_)
        | LinkError::SequenceGap { .. }
        | LinkError::Diverged { .. }
        | LinkError::RollbackFailed(_) => Some(backoff.next_delay()),
    }
}

/// Where to cut our log when the primary refuses our position.
///
/// Anything past the primary's end can't be in its log, so cut there first. Otherwise our newest
/// operation disagrees with the primary's at the same position; drop it and ask again.
pub(crate) fn rollback_target(local_last: SeqNo, primary_last: SeqNo) -> SeqNo {
    if primary_last < local_last {
        primary_last
    } else {
        local_last.saturating_prev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_cuts_to_primary_end_first() {
        assert_eq!(rollback_target(SeqNo::new(12), SeqNo::new(10)), SeqNo::new(10));
    }

    #[test]
    fn rollback_steps_back_on_same_length_divergence() {
        assert_eq!(rollback_target(SeqNo::new(10), SeqNo::new(10)), SeqNo::new(9));
        assert_eq!(rollback_target(SeqNo::new(10), SeqNo::new(15)), SeqNo::new(9));
        assert_eq!(rollback_target(SeqNo::new(1), SeqNo::new(15)), SeqNo::ZERO);
    }

    #[test]
    fn rollback_target_converges() {
        // Walking back repeatedly always terminates at or before the primary's end.
        let primary_last = SeqNo::new(4);
        let mut local = SeqNo::new(9);
        let mut steps = 0;
        while local > SeqNo::ZERO {
            local = rollback_target(local, primary_last);
            steps += 1;
            assert!(local <= primary_last);
            assert!(steps <= 10);
        }
    }

    #[test]
    fn only_a_lost_upstream_stops_the_link() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(100));

        assert_eq!(retry_delay(&LinkError::StaleEpoch { current: Epoch::new(2) }, &mut backoff), None);
        assert_eq!(retry_delay(&LinkError::Superseded, &mut backoff), None);
        assert_eq!(retry_delay(&LinkError::NodeExited, &mut backoff), None);
    }

    #[test]
    fn gaps_and_failed_rollbacks_back_off() {
        let mut backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(100));
        let gap = LinkError::SequenceGap {
            expected: SeqNo::new(4),
            received: SeqNo::new(6),
        };
        let rollback = LinkError::RollbackFailed("local log write failed".to_string());

        // Repeated failures keep growing the delay instead of spinning
        let first = retry_delay(&gap, &mut backoff).unwrap();
        assert!(first >= Duration::from_millis(5));
        let second = retry_delay(&rollback, &mut backoff).unwrap();
        assert!(second >= Duration::from_millis(10));
        let third = retry_delay(&gap, &mut backoff).unwrap();
        assert!(third >= Duration::from_millis(20));
        let fourth = retry_delay(&LinkError::Broken("connection refused".to_string()), &mut backoff).unwrap();
        assert!(fourth >= Duration::from_millis(40));
    }

    #[test]
    fn client_errors_classify() {
        assert!(matches!(
            LinkError::from(ClientError::SequenceGap { primary_last: SeqNo::new(3) }),
            LinkError::Diverged { primary_last } if primary_last == SeqNo::new(3)
        ));
        assert!(matches!(
            LinkError::from(ClientError::StaleEpoch { current: Epoch::new(2) }),
            LinkError::StaleEpoch { .. }
        ));
        assert!(matches!(
            LinkError::from(ClientError::NotPrimary { primary: None }),
            LinkError::Broken(_)
        ));
        assert!(matches!(LinkError::from(ClientError::Timeout), LinkError::Broken(_)));
    }
}
