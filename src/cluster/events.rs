use crate::cluster::NodeId;
use tokio::sync::mpsc;

/// Things nodes tell the cluster controller without being asked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ClusterEvent {
    /// `reporter`'s replication link to `peer` has failed `consecutive_failures` times in a row.
    LinkUnreachable {
        reporter: NodeId,
        peer: NodeId,
        consecutive_failures: u32,
    },
    LinkRecovered {
        reporter: NodeId,
        peer: NodeId,
    },
}

#[derive(Clone)]
pub(crate) struct ClusterEventPublisher {
    sender: mpsc::UnboundedSender<ClusterEvent>,
}

pub(crate) struct ClusterEventStream {
    receiver: mpsc::UnboundedReceiver<ClusterEvent>,
}

pub(crate) fn event_channel() -> (ClusterEventPublisher, ClusterEventStream) {
    let (tx, rx) = mpsc::unbounded_channel();

    (
        ClusterEventPublisher { sender: tx },
        ClusterEventStream { receiver: rx },
    )
}

impl ClusterEventPublisher {
    pub(crate) fn publish(&self, logger: &slog::Logger, event: ClusterEvent) {
        if self.sender.send(event).is_err() {
            slog::warn!(logger, "ClusterEventStream has disconnected.");
        }
    }
}

impl ClusterEventStream {
    pub(crate) async fn recv(&mut self) -> Option<ClusterEvent> {
        self.receiver.recv().await
    }
}
