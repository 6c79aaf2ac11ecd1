use crate::actor::WeakActorClient;
use crate::cluster::{ControlCommand, Epoch, NodeId, Role};
use crate::grpc::grpc_replica_server::{GrpcReplica, GrpcReplicaServer};
use crate::grpc::{
    proto_control_result, proto_node_error, proto_read_result, proto_write_result, ProtoCommand, ProtoControlReq,
    ProtoControlResult, ProtoControlSuccess, ProtoInvalidTransition, ProtoNodeError, ProtoNodeRemoved,
    ProtoNotPrimary, ProtoNotPrimaryNoStaleReads, ProtoReadReq, ProtoReadResult, ProtoReadSuccess, ProtoRole,
    ProtoServerFault, ProtoShutdownReq, ProtoShutdownResult, ProtoStaleEpoch, ProtoStatusReq, ProtoStatusResult,
    ProtoStreamMsg, ProtoStreamReq, ProtoWriteReq, ProtoWriteResult, ProtoWriteSuccess,
};
use crate::node::{
    ControlError, ControlOutput, Document, Filter, ReadError, ReadInput, ReadOutput, StreamError, StreamInput,
    StreamOutput, WriteError, WriteInput, WriteOutput,
};
use crate::oplog::SeqNo;
use crate::server::RpcServerShutdownSignal;
use bytes::Bytes;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, TcpListenerStream};
use tonic::transport::Server;
use tonic::{Code, Request, Response, Status};

// Outbound operations buffered per stream before the pump waits on the secondary.
const STREAM_BUFFER: usize = 128;

/// RpcServer is the type that implements the node's gRPC interface.
pub struct RpcServer {
    logger: slog::Logger,
    local_node: WeakActorClient,
}

impl RpcServer {
    pub(crate) fn new(logger: slog::Logger, local_node: WeakActorClient) -> Self {
        RpcServer { logger, local_node }
    }

    pub(crate) async fn run(self, listener: TcpListener, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", listener.local_addr());

        let result = Server::builder()
            .add_service(GrpcReplicaServer::new(self))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    async fn handle_write(&self, rpc_request: ProtoWriteReq) -> Result<ProtoWriteResult, Status> {
        let app_input = Self::convert_write_input(rpc_request)?;
        let app_result = self.local_node.write(app_input).await;
        Ok(Self::convert_write_result(app_result))
    }

    fn convert_write_input(rpc_request: ProtoWriteReq) -> Result<WriteInput, Status> {
        let document = Document::from_json_body(rpc_request.collection, &rpc_request.document)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        Ok(WriteInput {
            document,
            epoch: Self::convert_epoch_tag(rpc_request.epoch),
        })
    }

    fn convert_epoch_tag(epoch: u64) -> Option<Epoch> {
        match epoch {
            0 => None,
            epoch => Some(Epoch::new(epoch)),
        }
    }

    fn convert_write_result(app_result: Result<WriteOutput, WriteError>) -> ProtoWriteResult {
        let err = match app_result {
            Ok(ok) => {
                return ProtoWriteResult {
                    result: Some(proto_write_result::Result::Ok(ProtoWriteSuccess {
                        sequence_number: ok.seq.as_u64(),
                        epoch: ok.epoch.as_u64(),
                    })),
                }
            }
            Err(WriteError::NotPrimary { primary }) => not_primary(primary),
            Err(WriteError::InvalidDocument(e)) => server_fault(format!("Failed to encode document: {}", e)),
            Err(WriteError::LocalIoError(_)) => server_fault("Local IO failure"),
            Err(WriteError::ActorExited) => server_fault("Server internal node task has exited"),
        };

        ProtoWriteResult {
            result: Some(proto_write_result::Result::Err(err)),
        }
    }

    async fn handle_read(&self, rpc_request: ProtoReadReq) -> Result<ProtoReadResult, Status> {
        let app_input = Self::convert_read_input(rpc_request)?;
        let app_result = self.local_node.read(app_input).await;
        Ok(Self::convert_read_result(app_result))
    }

    fn convert_read_input(rpc_request: ProtoReadReq) -> Result<ReadInput, Status> {
        let filter = Filter::from_json_conditions(rpc_request.collection, &rpc_request.filter)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        Ok(ReadInput {
            filter,
            allow_stale: rpc_request.allow_stale,
        })
    }

    fn convert_read_result(app_result: Result<ReadOutput, ReadError>) -> ProtoReadResult {
        let err = match app_result {
            Ok(ok) => {
                return ProtoReadResult {
                    result: Some(proto_read_result::Result::Ok(ProtoReadSuccess {
                        documents: ok.documents.iter().map(Document::body_json).collect(),
                        last_sequence_number: ok.last_seq.as_u64(),
                    })),
                }
            }
            Err(ReadError::NotPrimaryNoStaleReadsAllowed) => ProtoNodeError {
                err: Some(proto_node_error::Err::NotPrimaryNoStaleReads(ProtoNotPrimaryNoStaleReads {
                    // Empty
                })),
            },
            Err(ReadError::NodeRemoved) => ProtoNodeError {
                err: Some(proto_node_error::Err::NodeRemoved(ProtoNodeRemoved {
                    // Empty
                })),
            },
            Err(ReadError::CorruptDocument(e)) => server_fault(format!("Corrupt operation log: {}", e)),
            Err(ReadError::LocalIoError(_)) => server_fault("Local IO failure"),
            Err(ReadError::ActorExited) => server_fault("Server internal node task has exited"),
        };

        ProtoReadResult {
            result: Some(proto_read_result::Result::Err(err)),
        }
    }

    async fn handle_status(&self) -> Result<ProtoStatusResult, Status> {
        let status = self
            .local_node
            .status()
            .await
            .map_err(|e| Status::unavailable(e.to_string()))?;

        Ok(ProtoStatusResult {
            node_id: status.node_id.into_inner(),
            role: convert_role(status.role) as i32,
            epoch: status.epoch.as_u64(),
            primary_id: status.primary.map(NodeId::into_inner).unwrap_or_default(),
            last_sequence_number: status.last_seq.as_u64(),
        })
    }

    async fn handle_control(&self, rpc_request: ProtoControlReq) -> Result<ProtoControlResult, Status> {
        let command = Self::convert_control_input(rpc_request)?;
        let app_result = self.local_node.control(command).await;
        Ok(Self::convert_control_result(app_result))
    }

    fn convert_control_input(rpc_request: ProtoControlReq) -> Result<ControlCommand, Status> {
        if rpc_request.target.is_empty() {
            return Err(Status::invalid_argument("Control command target is empty"));
        }
        let epoch = Epoch::new(rpc_request.epoch);
        let target = NodeId::new(rpc_request.target);

        match ProtoCommand::from_i32(rpc_request.command) {
            Some(ProtoCommand::Promote) => Ok(ControlCommand::promote(epoch, target)),
            Some(ProtoCommand::Demote) => Ok(ControlCommand::demote(epoch, target)),
            Some(ProtoCommand::Remove) => Ok(ControlCommand::remove(epoch, target)),
            Some(ProtoCommand::Unspecified) | None => Err(Status::invalid_argument("Unknown control command")),
        }
    }

    fn convert_control_result(app_result: Result<ControlOutput, ControlError>) -> ProtoControlResult {
        let err = match app_result {
            Ok(ok) => {
                return ProtoControlResult {
                    result: Some(proto_control_result::Result::Ok(ProtoControlSuccess {
                        role: convert_role(ok.role) as i32,
                        epoch: ok.epoch.as_u64(),
                    })),
                }
            }
            Err(ControlError::StaleEpoch { current }) => stale_epoch(current),
            Err(ControlError::InvalidTransition(message)) => invalid_transition(message),
            Err(ControlError::UnknownTarget(target)) => invalid_transition(format!("Unknown target {:?}", target)),
            Err(ControlError::ActorExited) => server_fault("Server internal node task has exited"),
        };

        ProtoControlResult {
            result: Some(proto_control_result::Result::Err(err)),
        }
    }

    async fn handle_shutdown(&self) -> Result<ProtoShutdownResult, Status> {
        // The node stops its server as part of shutting down; this reply still goes out because
        // the server drains in-flight requests first.
        if self.local_node.shutdown().await.is_err() {
            slog::info!(self.logger, "Shutdown requested, but node has already exited");
        }

        Ok(ProtoShutdownResult {
            // Empty
        })
    }

    async fn handle_stream_operations(
        &self,
        rpc_request: ProtoStreamReq,
    ) -> Result<ReceiverStream<Result<ProtoStreamMsg, Status>>, Status> {
        let app_input = Self::convert_stream_input(rpc_request)?;
        let output = self
            .local_node
            .open_stream(app_input)
            .await
            .map_err(Self::convert_stream_error)?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(pump_stream(self.logger.clone(), output, tx));

        Ok(ReceiverStream::new(rx))
    }

    fn convert_stream_input(rpc_request: ProtoStreamReq) -> Result<StreamInput, Status> {
        let after = match (rpc_request.after_sequence_number, rpc_request.after_epoch) {
            (0, _) => None,
            (_, 0) => {
                return Err(Status::invalid_argument(
                    "AfterSequenceNumber non-0 and AfterEpoch 0",
                ))
            }
            (seq, epoch) => Some((SeqNo::new(seq), Epoch::new(epoch))),
        };

        Ok(StreamInput {
            requester: NodeId::new(rpc_request.requester_id),
            epoch: Epoch::new(rpc_request.epoch),
            after,
        })
    }

    // Stream refusals can only travel as a Status. Numbers go in the details as big-endian u64.
    fn convert_stream_error(err: StreamError) -> Status {
        match err {
            StreamError::NotPrimary { primary } => Status::with_details(
                Code::FailedPrecondition,
                "not master",
                Bytes::from(primary.map(NodeId::into_inner).unwrap_or_default()),
            ),
            StreamError::StaleEpoch { current } => Status::with_details(
                Code::Aborted,
                format!("Stale epoch. Current epoch is {:?}", current),
                Bytes::copy_from_slice(&current.as_u64().to_be_bytes()),
            ),
            StreamError::SequenceGap { primary_last } => Status::with_details(
                Code::OutOfRange,
                format!("Log diverges. Primary log ends at {:?}", primary_last),
                Bytes::copy_from_slice(&primary_last.as_u64().to_be_bytes()),
            ),
            StreamError::LocalIoError(_) => Status::internal("Local IO failure"),
            StreamError::ActorExited => Status::unavailable("Server internal node task has exited"),
        }
    }
}

/// Forward operations from a `LogReader` to one secondary until the reader ends (primacy lost,
/// node shut down) or the secondary goes away.
async fn pump_stream(logger: slog::Logger, output: StreamOutput, tx: mpsc::Sender<Result<ProtoStreamMsg, Status>>) {
    let StreamOutput { epoch, mut reader } = output;

    loop {
        let next = tokio::select! {
            next = reader.next() => next,
            _ = tx.closed() => break,
        };

        match next {
            Ok(Some(op)) => {
                let msg = ProtoStreamMsg {
                    epoch: epoch.as_u64(),
                    sequence_number: op.seq.as_u64(),
                    op_epoch: op.epoch.as_u64(),
                    timestamp_millis: op.timestamp_millis(),
                    payload: op.payload.to_vec(),
                };
                if tx.send(Ok(msg)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                slog::warn!(logger, "Failed reading operation log for stream: {:?}", e);
                let _ = tx.send(Err(Status::internal("Local IO failure"))).await;
                break;
            }
        }
    }

    slog::debug!(logger, "Operation stream ended at {:?}", reader.position());
}

fn convert_role(role: Role) -> ProtoRole {
    match role {
        Role::Uninitialized => ProtoRole::Uninitialized,
        Role::Secondary => ProtoRole::Secondary,
        Role::Primary => ProtoRole::Primary,
        Role::Removed => ProtoRole::Removed,
    }
}

fn not_primary(primary: Option<NodeId>) -> ProtoNodeError {
    ProtoNodeError {
        err: Some(proto_node_error::Err::NotPrimary(ProtoNotPrimary {
            primary_id: primary.map(NodeId::into_inner).unwrap_or_default(),
        })),
    }
}

fn stale_epoch(current: Epoch) -> ProtoNodeError {
    ProtoNodeError {
        err: Some(proto_node_error::Err::StaleEpoch(ProtoStaleEpoch {
            current_epoch: current.as_u64(),
        })),
    }
}

fn invalid_transition(message: String) -> ProtoNodeError {
    ProtoNodeError {
        err: Some(proto_node_error::Err::InvalidTransition(ProtoInvalidTransition { message })),
    }
}

fn server_fault<S: Into<String>>(message: S) -> ProtoNodeError {
    ProtoNodeError {
        err: Some(proto_node_error::Err::ServerFault(ProtoServerFault {
            message: message.into(),
        })),
    }
}

#[async_trait::async_trait]
impl GrpcReplica for RpcServer {
    async fn write(&self, rpc_request_wrapped: Request<ProtoWriteReq>) -> Result<Response<ProtoWriteResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_write(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn read(&self, rpc_request_wrapped: Request<ProtoReadReq>) -> Result<Response<ProtoReadResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_read(rpc_request).await;

        rpc_result.map(Response::new)
    }

    async fn status(&self, _: Request<ProtoStatusReq>) -> Result<Response<ProtoStatusResult>, Status> {
        self.handle_status().await.map(Response::new)
    }

    async fn control(&self, rpc_request_wrapped: Request<ProtoControlReq>) -> Result<Response<ProtoControlResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_control(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn shutdown(&self, _: Request<ProtoShutdownReq>) -> Result<Response<ProtoShutdownResult>, Status> {
        slog::info!(self.logger, "ServerWire - shutdown requested");
        self.handle_shutdown().await.map(Response::new)
    }

    type StreamOperationsStream = ReceiverStream<Result<ProtoStreamMsg, Status>>;

    async fn stream_operations(
        &self,
        rpc_request_wrapped: Request<ProtoStreamReq>,
    ) -> Result<Response<Self::StreamOperationsStream>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        self.handle_stream_operations(rpc_request).await.map(Response::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_input_requires_epoch_with_position() {
        let input = RpcServer::convert_stream_input(ProtoStreamReq {
            requester_id: "node-2".to_string(),
            epoch: 1,
            after_sequence_number: 0,
            after_epoch: 0,
        })
        .unwrap();
        assert!(input.after.is_none());

        let err = RpcServer::convert_stream_input(ProtoStreamReq {
            requester_id: "node-2".to_string(),
            epoch: 1,
            after_sequence_number: 4,
            after_epoch: 0,
        })
        .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }

    #[test]
    fn control_input_rejects_unknown_commands() {
        let err = RpcServer::convert_control_input(ProtoControlReq {
            epoch: 2,
            command: ProtoCommand::Unspecified as i32,
            target: "node-1".to_string(),
        })
        .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);

        let command = RpcServer::convert_control_input(ProtoControlReq {
            epoch: 2,
            command: ProtoCommand::Demote as i32,
            target: "node-1".to_string(),
        })
        .unwrap();
        assert_eq!(command, ControlCommand::demote(Epoch::new(2), NodeId::from("node-1")));
    }

    #[test]
    fn write_input_requires_json_object() {
        let err = RpcServer::convert_write_input(ProtoWriteReq {
            collection: "coll".to_string(),
            document: b"[]".to_vec(),
            epoch: 0,
        })
        .unwrap_err();
        assert_eq!(err.code(), Code::InvalidArgument);
    }
}
