use crate::cluster::{Epoch, NodeId};
use crate::grpc::{proto_node_error, ProtoNodeError};
use crate::node::DocumentError;
use crate::oplog::SeqNo;
use tonic::codegen::http::uri;

/// Error code a MongoDB shell prints for a write sent to a non-primary.
pub const NOT_PRIMARY_CODE: i32 = 10107;
/// Error code a MongoDB shell prints for a read on a secondary without `slaveOk`.
pub const NOT_PRIMARY_NO_STALE_READS_CODE: i32 = 13435;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("not master")]
    NotPrimary { primary: Option<NodeId> },
    #[error("not master and slaveOk=false")]
    NotPrimaryNoStaleReadsAllowed,
    #[error("Stale epoch. Current epoch is {current:?}")]
    StaleEpoch { current: Epoch },
    #[error("Invalid role transition: {0}")]
    InvalidTransition(String),
    #[error("Node has been removed from the replica set")]
    NodeRemoved,
    #[error("Log diverges from primary, whose log ends at {primary_last:?}")]
    SequenceGap { primary_last: SeqNo },
    #[error("Server fault: {0}")]
    ServerFault(String),
    #[error("Invalid document: {0}")]
    InvalidDocument(#[from] DocumentError),
    #[error("Invalid node address: {0}")]
    InvalidUri(#[from] uri::InvalidUri),
    #[error("Failed to connect: {0}")]
    Connect(#[from] tonic::transport::Error),
    #[error("RPC failed: {0}")]
    Rpc(tonic::Status),
    #[error("RPC timed out")]
    Timeout,
    #[error("Malformed response: {0}")]
    MalformedResponse(&'static str),
}

impl ClientError {
    /// Numeric error code, for the errors a MongoDB client would recognize.
    pub fn code(&self) -> Option<i32> {
        match self {
            ClientError::NotPrimary { .. } => Some(NOT_PRIMARY_CODE),
            ClientError::NotPrimaryNoStaleReadsAllowed => Some(NOT_PRIMARY_NO_STALE_READS_CODE),
            _ => None,
        }
    }

    pub fn code_name(&self) -> Option<&'static str> {
        match self {
            ClientError::NotPrimary { .. } => Some("NotMaster"),
            ClientError::NotPrimaryNoStaleReadsAllowed => Some("NotMasterNoSlaveOk"),
            _ => None,
        }
    }

    /// Network-level failures, as opposed to a node answering with a refusal.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            ClientError::Connect(_) | ClientError::Rpc(_) | ClientError::Timeout
        )
    }

    pub(crate) fn from_proto(err: ProtoNodeError) -> Self {
        match err.err {
            Some(proto_node_error::Err::NotPrimary(e)) => ClientError::NotPrimary {
                primary: non_empty_id(e.primary_id),
            },
            Some(proto_node_error::Err::NotPrimaryNoStaleReads(_)) => ClientError::NotPrimaryNoStaleReadsAllowed,
            Some(proto_node_error::Err::StaleEpoch(e)) => ClientError::StaleEpoch {
                current: Epoch::new(e.current_epoch),
            },
            Some(proto_node_error::Err::InvalidTransition(e)) => ClientError::InvalidTransition(e.message),
            Some(proto_node_error::Err::NodeRemoved(_)) => ClientError::NodeRemoved,
            Some(proto_node_error::Err::ServerFault(e)) => ClientError::ServerFault(e.message),
            None => ClientError::MalformedResponse("error without a reason"),
        }
    }
}

pub(crate) fn non_empty_id(id: String) -> Option<NodeId> {
    if id.is_empty() {
        None
    } else {
        Some(NodeId::new(id))
    }
}
