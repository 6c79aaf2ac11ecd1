use crate::cluster::{Epoch, NodeId, Role};
use crate::node::document::{Document, DocumentError, Filter};
use crate::oplog::{LogReader, Operation, SeqNo};
use std::io;

#[derive(Debug)]
pub(crate) struct WriteInput {
    pub(crate) document: Document,
    // Highest epoch the client has observed. `None` means untagged.
    pub(crate) epoch: Option<Epoch>,
}

#[derive(Debug)]
pub(crate) struct WriteOutput {
    pub(crate) seq: SeqNo,
    pub(crate) epoch: Epoch,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum WriteError {
    #[error("Not primary. Primary is {primary:?}")]
    NotPrimary { primary: Option<NodeId> },
    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] DocumentError),
    #[error("Failed to persist operation")]
    LocalIoError(#[from] io::Error),
    #[error("Node actor has exited")]
    ActorExited,
}

#[derive(Debug)]
pub(crate) struct ReadInput {
    pub(crate) filter: Filter,
    pub(crate) allow_stale: bool,
}

#[derive(Debug)]
pub(crate) struct ReadOutput {
    pub(crate) documents: Vec<Document>,
    pub(crate) last_seq: SeqNo,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ReadError {
    #[error("Not primary and stale reads are not allowed")]
    NotPrimaryNoStaleReadsAllowed,
    #[error("Node has been removed from the replica set")]
    NodeRemoved,
    #[error("Stored operation is not a document: {0}")]
    CorruptDocument(#[from] DocumentError),
    #[error("Failed to read operation log")]
    LocalIoError(#[from] io::Error),
    #[error("Node actor has exited")]
    ActorExited,
}

/// A node's answer to "isMaster": who it is, what it thinks the replica set looks like, and how
/// far its log goes.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeStatus {
    pub node_id: NodeId,
    pub role: Role,
    pub epoch: Epoch,
    pub primary: Option<NodeId>,
    pub last_seq: SeqNo,
}

#[derive(Debug)]
pub(crate) struct ControlOutput {
    pub(crate) role: Role,
    pub(crate) epoch: Epoch,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ControlError {
    #[error("Command epoch is stale. Current epoch is {current:?}")]
    StaleEpoch { current: Epoch },
    #[error("Invalid role transition: {0}")]
    InvalidTransition(String),
    #[error("Unknown target {0:?}")]
    UnknownTarget(NodeId),
    #[error("Node actor has exited")]
    ActorExited,
}

#[derive(Debug)]
pub(crate) struct StreamInput {
    pub(crate) requester: NodeId,
    pub(crate) epoch: Epoch,
    // Requester's newest operation. `None` if its log is empty.
    pub(crate) after: Option<(SeqNo, Epoch)>,
}

#[derive(Debug)]
pub(crate) struct StreamOutput {
    pub(crate) epoch: Epoch,
    pub(crate) reader: LogReader,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum StreamError {
    #[error("Not primary. Primary is {primary:?}")]
    NotPrimary { primary: Option<NodeId> },
    #[error("Requester epoch is newer. My epoch is {current:?}")]
    StaleEpoch { current: Epoch },
    #[error("Requester log diverges from mine, which ends at {primary_last:?}")]
    SequenceGap { primary_last: SeqNo },
    #[error("Failed to read operation log")]
    LocalIoError(#[from] io::Error),
    #[error("Node actor has exited")]
    ActorExited,
}

#[derive(Debug)]
pub(crate) struct ApplyInput {
    pub(crate) source: NodeId,
    pub(crate) stream_epoch: Epoch,
    pub(crate) op: Operation,
}

#[derive(Debug)]
pub(crate) struct RollbackInput {
    pub(crate) source: NodeId,
    pub(crate) to: SeqNo,
}

#[derive(Debug)]
pub(crate) struct RollbackOutput {
    pub(crate) last_seq: SeqNo,
    pub(crate) dropped: u64,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApplyError {
    #[error("Stream epoch is stale. Current epoch is {current:?}")]
    StaleEpoch { current: Epoch },
    #[error("Not following the stream's source")]
    NotFollowing,
    #[error("Sequence gap: expected {expected:?}, received {received:?}")]
    SequenceGap { expected: SeqNo, received: SeqNo },
    #[error("Failed to persist operation")]
    LocalIoError(#[from] io::Error),
    #[error("Node actor has exited")]
    ActorExited,
}

/// What a replication link tells its node about the health of its upstream.
#[derive(Debug)]
pub(crate) enum LinkReport {
    Unreachable { peer: NodeId, consecutive_failures: u32 },
    Recovered { peer: NodeId },
}
