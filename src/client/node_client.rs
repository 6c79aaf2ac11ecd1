use crate::client::error::{non_empty_id, ClientError};
use crate::cluster::{CommandKind, ControlCommand, Epoch, NodeId, Role};
use crate::grpc::grpc_replica_client::GrpcReplicaClient;
use crate::grpc::{
    proto_control_result, proto_read_result, proto_write_result, ProtoCommand, ProtoControlReq, ProtoReadReq,
    ProtoRole, ProtoShutdownReq, ProtoStatusReq, ProtoStatusResult, ProtoStreamMsg, ProtoStreamReq, ProtoWriteReq,
};
use crate::node::{Document, Filter, NodeStatus};
use crate::oplog::SeqNo;
use std::convert::TryInto;
use std::future::Future;
use std::net::SocketAddr;
use tokio::time::{timeout, Duration};
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Response, Status, Streaming};

/// NodeClient is a typed handle to one node's RPC service. It is cheap to clone; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct NodeClient {
    addr: SocketAddr,
    inner: GrpcReplicaClient<Channel>,
    rpc_timeout: Duration,
}

impl NodeClient {
    pub async fn connect(addr: SocketAddr, rpc_timeout: Duration) -> Result<Self, ClientError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", addr))?;

        let channel = timeout(rpc_timeout, endpoint.connect())
            .await
            .map_err(|_| ClientError::Timeout)??;

        Ok(NodeClient {
            addr,
            inner: GrpcReplicaClient::new(channel),
            rpc_timeout,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn write(&self, document: &Document, epoch: Option<Epoch>) -> Result<(SeqNo, Epoch), ClientError> {
        let request = ProtoWriteReq {
            collection: document.collection.clone(),
            document: document.body_json(),
            epoch: epoch.map(|e| e.as_u64()).unwrap_or(0),
        };

        let mut client = self.inner.clone();
        let reply = self.unary(client.write(request)).await?;

        match reply.result {
            Some(proto_write_result::Result::Ok(ok)) => Ok((SeqNo::new(ok.sequence_number), Epoch::new(ok.epoch))),
            Some(proto_write_result::Result::Err(err)) => Err(ClientError::from_proto(err)),
            None => Err(ClientError::MalformedResponse("empty write result")),
        }
    }

    pub async fn read(&self, filter: &Filter, allow_stale: bool) -> Result<(Vec<Document>, SeqNo), ClientError> {
        let request = ProtoReadReq {
            collection: filter.collection.clone(),
            filter: filter.conditions_json(),
            allow_stale,
        };

        let mut client = self.inner.clone();
        let reply = self.unary(client.read(request)).await?;

        match reply.result {
            Some(proto_read_result::Result::Ok(ok)) => {
                let mut documents = Vec::with_capacity(ok.documents.len());
                for body in ok.documents {
                    documents.push(Document::from_json_body(filter.collection.clone(), &body)?);
                }
                Ok((documents, SeqNo::new(ok.last_sequence_number)))
            }
            Some(proto_read_result::Result::Err(err)) => Err(ClientError::from_proto(err)),
            None => Err(ClientError::MalformedResponse("empty read result")),
        }
    }

    pub async fn status(&self) -> Result<NodeStatus, ClientError> {
        let mut client = self.inner.clone();
        let reply = self.unary(client.status(ProtoStatusReq {})).await?;

        convert_status(reply)
    }

    /// Returns the node's role and epoch after applying `command`.
    pub async fn control(&self, command: &ControlCommand) -> Result<(Role, Epoch), ClientError> {
        let kind = match command.kind {
            CommandKind::Promote => ProtoCommand::Promote,
            CommandKind::Demote => ProtoCommand::Demote,
            CommandKind::Remove => ProtoCommand::Remove,
        };
        let request = ProtoControlReq {
            epoch: command.epoch.as_u64(),
            command: kind as i32,
            target: command.target.as_str().to_string(),
        };

        let mut client = self.inner.clone();
        let reply = self.unary(client.control(request)).await?;

        match reply.result {
            Some(proto_control_result::Result::Ok(ok)) => Ok((convert_role(ok.role)?, Epoch::new(ok.epoch))),
            Some(proto_control_result::Result::Err(err)) => Err(ClientError::from_proto(err)),
            None => Err(ClientError::MalformedResponse("empty control result")),
        }
    }

    /// Equivalent of `adminCommand({shutdown: 1})`.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let mut client = self.inner.clone();
        self.unary(client.shutdown(ProtoShutdownReq {})).await?;

        Ok(())
    }

    /// Open the primary's operation stream. Only the open is bounded by the RPC timeout; the
    /// stream itself stays open until either side ends it.
    pub(crate) async fn stream_operations(
        &self,
        requester: &NodeId,
        epoch: Epoch,
        after: Option<(SeqNo, Epoch)>,
    ) -> Result<Streaming<ProtoStreamMsg>, ClientError> {
        let (after_seq, after_epoch) = after.unwrap_or((SeqNo::ZERO, Epoch::default()));
        let request = ProtoStreamReq {
            requester_id: requester.as_str().to_string(),
            epoch: epoch.as_u64(),
            after_sequence_number: after_seq.as_u64(),
            after_epoch: after_epoch.as_u64(),
        };

        let mut client = self.inner.clone();
        match timeout(self.rpc_timeout, client.stream_operations(request)).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(convert_stream_status(status)),
        }
    }

    async fn unary<F, T>(&self, call: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<Response<T>, Status>>,
    {
        match timeout(self.rpc_timeout, call).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Err(status)) => Err(ClientError::Rpc(status)),
            Ok(Ok(response)) => Ok(response.into_inner()),
        }
    }
}

fn convert_status(reply: ProtoStatusResult) -> Result<NodeStatus, ClientError> {
    Ok(NodeStatus {
        node_id: NodeId::new(reply.node_id),
        role: convert_role(reply.role)?,
        epoch: Epoch::new(reply.epoch),
        primary: non_empty_id(reply.primary_id),
        last_seq: SeqNo::new(reply.last_sequence_number),
    })
}

fn convert_role(role: i32) -> Result<Role, ClientError> {
    match ProtoRole::from_i32(role) {
        Some(ProtoRole::Uninitialized) => Ok(Role::Uninitialized),
        Some(ProtoRole::Secondary) => Ok(Role::Secondary),
        Some(ProtoRole::Primary) => Ok(Role::Primary),
        Some(ProtoRole::Removed) => Ok(Role::Removed),
        None => Err(ClientError::MalformedResponse("unknown role")),
    }
}

// Stream open refusals arrive as gRPC statuses, with the primary id or a big-endian number in
// the status details.
fn convert_stream_status(status: Status) -> ClientError {
    match status.code() {
        Code::FailedPrecondition => ClientError::NotPrimary {
            primary: non_empty_id(String::from_utf8_lossy(status.details()).into_owned()),
        },
        Code::Aborted => match details_u64(&status) {
            Some(current) => ClientError::StaleEpoch {
                current: Epoch::new(current),
            },
            None => ClientError::Rpc(status),
        },
        Code::OutOfRange => match details_u64(&status) {
            Some(primary_last) => ClientError::SequenceGap {
                primary_last: SeqNo::new(primary_last),
            },
            None => ClientError::Rpc(status),
        },
        _ => ClientError::Rpc(status),
    }
}

fn details_u64(status: &Status) -> Option<u64> {
    let bytes: [u8; 8] = status.details().try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn stream_refusals_map_to_typed_errors() {
        let status = Status::with_details(Code::OutOfRange, "gap", Bytes::copy_from_slice(&7u64.to_be_bytes()));
        assert!(matches!(
            convert_stream_status(status),
            ClientError::SequenceGap { primary_last } if primary_last == SeqNo::new(7)
        ));

        let status = Status::with_details(Code::Aborted, "stale", Bytes::copy_from_slice(&3u64.to_be_bytes()));
        assert!(matches!(
            convert_stream_status(status),
            ClientError::StaleEpoch { current } if current == Epoch::new(3)
        ));

        let status = Status::with_details(Code::FailedPrecondition, "not master", Bytes::from("node-2"));
        assert!(matches!(
            convert_stream_status(status),
            ClientError::NotPrimary { primary: Some(ref p) } if p.as_str() == "node-2"
        ));

        // Details missing
        let status = Status::new(Code::Aborted, "stale");
        assert!(matches!(convert_stream_status(status), ClientError::Rpc(_)));
    }

    #[test]
    fn unknown_roles_are_malformed() {
        assert_eq!(convert_role(ProtoRole::Primary as i32).unwrap(), Role::Primary);
        assert!(matches!(convert_role(42), Err(ClientError::MalformedResponse(_))));
    }
}
