use crate::cluster::ControlCommand;
use crate::node::{
    ApplyError, ApplyInput, ControlError, ControlOutput, LinkReport, Node, NodeStatus, ReadError, ReadInput,
    ReadOutput, RollbackInput, RollbackOutput, StreamError, StreamInput, StreamOutput, WriteError, WriteInput,
    WriteOutput,
};
use std::error::Error;
use std::fmt::Debug;
use tokio::sync::{mpsc, oneshot};

pub(crate) fn create(buffer_size: usize) -> (ActorClient, ActorQueue) {
    let (tx, rx) = mpsc::channel(buffer_size);

    (ActorClient { sender: tx }, ActorQueue { receiver: rx })
}

// Every event that can change node state goes through here, so role, log and link changes are
// totally ordered per node.
#[derive(Debug)]
enum Event {
    // Primary: append to the local log.
    // Otherwise: reject.
    Write(WriteInput, Callback<WriteOutput, WriteError>),

    // Primary: serve.
    // Secondary: serve if the connection allows stale reads.
    Read(ReadInput, Callback<ReadOutput, ReadError>),

    Status(oneshot::Sender<NodeStatus>),

    // From the cluster controller. Any role change restarts or stops background tasks.
    Control(ControlCommand, Callback<ControlOutput, ControlError>),

    // Primary: hand back a reader positioned after the requester's log.
    // Otherwise: reject.
    OpenStream(StreamInput, Callback<StreamOutput, StreamError>),

    // From our own replication link.
    ApplyReplicated(ApplyInput, Callback<(), ApplyError>),
    Rollback(RollbackInput, Callback<RollbackOutput, ApplyError>),
    LinkReport(LinkReport),

    // Stops background tasks and the RPC server, then ends the event loop.
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug)]
struct Callback<O: Debug, E: Error>(oneshot::Sender<Result<O, E>>);

impl<O: Debug, E: Error> Callback<O, E> {
    pub fn send(self, message: Result<O, E>) {
        let _ = self.0.send(message);
    }
}

#[derive(Clone)]
pub(crate) struct ActorClient {
    sender: mpsc::Sender<Event>,
}

impl ActorClient {
    pub(crate) fn weak(&self) -> WeakActorClient {
        WeakActorClient {
            sender: self.sender.downgrade(),
        }
    }

    pub(crate) async fn write(&self, input: WriteInput) -> Result<WriteOutput, WriteError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Write(input, Callback(tx)))
            .await
            .map_err(|_| WriteError::ActorExited)?;

        rx.await.unwrap_or(Err(WriteError::ActorExited))
    }

    pub(crate) async fn read(&self, input: ReadInput) -> Result<ReadOutput, ReadError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Read(input, Callback(tx)))
            .await
            .map_err(|_| ReadError::ActorExited)?;

        rx.await.unwrap_or(Err(ReadError::ActorExited))
    }

    pub(crate) async fn status(&self) -> Result<NodeStatus, ActorExited> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Status(tx)).await?;

        rx.await.map_err(|_| ActorExited)
    }

    pub(crate) async fn control(&self, command: ControlCommand) -> Result<ControlOutput, ControlError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Control(command, Callback(tx)))
            .await
            .map_err(|_| ControlError::ActorExited)?;

        rx.await.unwrap_or(Err(ControlError::ActorExited))
    }

    pub(crate) async fn open_stream(&self, input: StreamInput) -> Result<StreamOutput, StreamError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::OpenStream(input, Callback(tx)))
            .await
            .map_err(|_| StreamError::ActorExited)?;

        rx.await.unwrap_or(Err(StreamError::ActorExited))
    }

    pub(crate) async fn apply_replicated(&self, input: ApplyInput) -> Result<(), ApplyError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::ApplyReplicated(input, Callback(tx)))
            .await
            .map_err(|_| ApplyError::ActorExited)?;

        rx.await.unwrap_or(Err(ApplyError::ActorExited))
    }

    pub(crate) async fn rollback(&self, input: RollbackInput) -> Result<RollbackOutput, ApplyError> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Rollback(input, Callback(tx)))
            .await
            .map_err(|_| ApplyError::ActorExited)?;

        rx.await.unwrap_or(Err(ApplyError::ActorExited))
    }

    pub(crate) async fn link_report(&self, report: LinkReport) -> Result<(), ActorExited> {
        self.send(Event::LinkReport(report)).await
    }

    /// Resolves once the node has stopped its background tasks.
    pub(crate) async fn shutdown(&self) -> Result<(), ActorExited> {
        let (tx, rx) = oneshot::channel();
        self.send(Event::Shutdown(tx)).await?;

        rx.await.map_err(|_| ActorExited)
    }

    async fn send(&self, event: Event) -> Result<(), ActorExited> {
        self.sender.send(event).await.map_err(|_| ActorExited)
    }
}

/// WeakActorClient doesn't keep the actor alive. Tasks the actor owns (RPC server, replication
/// link) hold one of these, so dropping the last `ActorClient` lets the event loop end.
#[derive(Clone)]
pub(crate) struct WeakActorClient {
    sender: mpsc::WeakSender<Event>,
}

impl WeakActorClient {
    pub(crate) fn upgrade(&self) -> Option<ActorClient> {
        self.sender.upgrade().map(|sender| ActorClient { sender })
    }

    pub(crate) async fn write(&self, input: WriteInput) -> Result<WriteOutput, WriteError> {
        match self.upgrade() {
            Some(client) => client.write(input).await,
            None => Err(WriteError::ActorExited),
        }
    }

    pub(crate) async fn read(&self, input: ReadInput) -> Result<ReadOutput, ReadError> {
        match self.upgrade() {
            Some(client) => client.read(input).await,
            None => Err(ReadError::ActorExited),
        }
    }

    pub(crate) async fn status(&self) -> Result<NodeStatus, ActorExited> {
        self.upgrade().ok_or(ActorExited)?.status().await
    }

    pub(crate) async fn control(&self, command: ControlCommand) -> Result<ControlOutput, ControlError> {
        match self.upgrade() {
            Some(client) => client.control(command).await,
            None => Err(ControlError::ActorExited),
        }
    }

    pub(crate) async fn open_stream(&self, input: StreamInput) -> Result<StreamOutput, StreamError> {
        match self.upgrade() {
            Some(client) => client.open_stream(input).await,
            None => Err(StreamError::ActorExited),
        }
    }

    pub(crate) async fn apply_replicated(&self, input: ApplyInput) -> Result<(), ApplyError> {
        match self.upgrade() {
            Some(client) => client.apply_replicated(input).await,
            None => Err(ApplyError::ActorExited),
        }
    }

    pub(crate) async fn rollback(&self, input: RollbackInput) -> Result<RollbackOutput, ApplyError> {
        match self.upgrade() {
            Some(client) => client.rollback(input).await,
            None => Err(ApplyError::ActorExited),
        }
    }

    pub(crate) async fn link_report(&self, report: LinkReport) -> Result<(), ActorExited> {
        self.upgrade().ok_or(ActorExited)?.link_report(report).await
    }

    pub(crate) async fn shutdown(&self) -> Result<(), ActorExited> {
        self.upgrade().ok_or(ActorExited)?.shutdown().await
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Node actor has exited")]
pub(crate) struct ActorExited;

/// Receiving half of the node's event queue. Pair it with a `Node` to get a running actor.
pub(crate) struct ActorQueue {
    receiver: mpsc::Receiver<Event>,
}

impl ActorQueue {
    pub(crate) fn into_actor(self, node: Node) -> NodeActor {
        NodeActor {
            receiver: self.receiver,
            node,
        }
    }
}

/// NodeActor is node logic in actor model.
pub(crate) struct NodeActor {
    receiver: mpsc::Receiver<Event>,
    node: Node,
}

impl NodeActor {
    pub(crate) async fn run_event_loop(mut self) {
        while let Some(event) = self.receiver.recv().await {
            if let Flow::Stop = self.handle_event(event) {
                break;
            }
        }
    }

    // This must NOT be async. Any long running work must be spawned on another task
    // and/or come as a callback to this actor.
    fn handle_event(&mut self, event: Event) -> Flow {
        match event {
            Event::Write(input, callback) => {
                callback.send(self.node.handle_write(input));
            }
            Event::Read(input, callback) => {
                callback.send(self.node.handle_read(input));
            }
            Event::Status(tx) => {
                let _ = tx.send(self.node.handle_status());
            }
            Event::Control(command, callback) => {
                callback.send(self.node.handle_control(command));
            }
            Event::OpenStream(input, callback) => {
                callback.send(self.node.handle_open_stream(input));
            }
            Event::ApplyReplicated(input, callback) => {
                callback.send(self.node.handle_apply_replicated(input));
            }
            Event::Rollback(input, callback) => {
                callback.send(self.node.handle_rollback(input));
            }
            Event::LinkReport(report) => {
                self.node.handle_link_report(report);
            }
            Event::Shutdown(tx) => {
                self.node.handle_shutdown();
                let _ = tx.send(());
                return Flow::Stop;
            }
        }

        Flow::Continue
    }
}

enum Flow {
    Continue,
    Stop,
}
