// ----- Errors -----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNodeError {
    #[prost(oneof = "proto_node_error::Err", tags = "1, 2, 3, 4, 5, 6")]
    pub err: ::core::option::Option<proto_node_error::Err>,
}
/// Nested message and enum types in `ProtoNodeError`.
pub mod proto_node_error {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Err {
        #[prost(message, tag = "1")]
        NotPrimary(super::ProtoNotPrimary),
        #[prost(message, tag = "2")]
        NotPrimaryNoStaleReads(super::ProtoNotPrimaryNoStaleReads),
        #[prost(message, tag = "3")]
        StaleEpoch(super::ProtoStaleEpoch),
        #[prost(message, tag = "4")]
        InvalidTransition(super::ProtoInvalidTransition),
        #[prost(message, tag = "5")]
        ServerFault(super::ProtoServerFault),
        #[prost(message, tag = "6")]
        NodeRemoved(super::ProtoNodeRemoved),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNotPrimary {
    /// Empty if this node doesn't know who the primary is.
    #[prost(string, tag = "1")]
    pub primary_id: ::prost::alloc::string::String,
}
/// Empty
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNotPrimaryNoStaleReads {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoStaleEpoch {
    #[prost(uint64, tag = "1")]
    pub current_epoch: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoInvalidTransition {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}
/// Empty
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoNodeRemoved {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoServerFault {
    #[prost(string, tag = "1")]
    pub message: ::prost::alloc::string::String,
}
// ----- Write -----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoWriteReq {
    #[prost(string, tag = "1")]
    pub collection: ::prost::alloc::string::String,
    /// JSON encoded document body.
    #[prost(bytes = "vec", tag = "2")]
    pub document: ::prost::alloc::vec::Vec<u8>,
    /// 0 means untagged.
    #[prost(uint64, tag = "3")]
    pub epoch: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoWriteResult {
    #[prost(oneof = "proto_write_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_write_result::Result>,
}
/// Nested message and enum types in `ProtoWriteResult`.
pub mod proto_write_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoWriteSuccess),
        #[prost(message, tag = "2")]
        Err(super::ProtoNodeError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoWriteSuccess {
    #[prost(uint64, tag = "1")]
    pub sequence_number: u64,
    #[prost(uint64, tag = "2")]
    pub epoch: u64,
}
// ----- Read -----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoReadReq {
    #[prost(string, tag = "1")]
    pub collection: ::prost::alloc::string::String,
    /// JSON encoded object of field equality conditions. Empty means match all.
    #[prost(bytes = "vec", tag = "2")]
    pub filter: ::prost::alloc::vec::Vec<u8>,
    #[prost(bool, tag = "3")]
    pub allow_stale: bool,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoReadResult {
    #[prost(oneof = "proto_read_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_read_result::Result>,
}
/// Nested message and enum types in `ProtoReadResult`.
pub mod proto_read_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoReadSuccess),
        #[prost(message, tag = "2")]
        Err(super::ProtoNodeError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoReadSuccess {
    /// JSON encoded document bodies, in log order.
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub documents: ::prost::alloc::vec::Vec<::prost::alloc::vec::Vec<u8>>,
    #[prost(uint64, tag = "2")]
    pub last_sequence_number: u64,
}
// ----- Status (isMaster) -----

/// Empty
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoStatusReq {}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoStatusResult {
    #[prost(string, tag = "1")]
    pub node_id: ::prost::alloc::string::String,
    #[prost(enumeration = "ProtoRole", tag = "2")]
    pub role: i32,
    #[prost(uint64, tag = "3")]
    pub epoch: u64,
    /// Empty if unknown.
    #[prost(string, tag = "4")]
    pub primary_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "5")]
    pub last_sequence_number: u64,
}
// ----- Control -----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoControlReq {
    #[prost(uint64, tag = "1")]
    pub epoch: u64,
    #[prost(enumeration = "ProtoCommand", tag = "2")]
    pub command: i32,
    #[prost(string, tag = "3")]
    pub target: ::prost::alloc::string::String,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoControlResult {
    #[prost(oneof = "proto_control_result::Result", tags = "1, 2")]
    pub result: ::core::option::Option<proto_control_result::Result>,
}
/// Nested message and enum types in `ProtoControlResult`.
pub mod proto_control_result {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Result {
        #[prost(message, tag = "1")]
        Ok(super::ProtoControlSuccess),
        #[prost(message, tag = "2")]
        Err(super::ProtoNodeError),
    }
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoControlSuccess {
    #[prost(enumeration = "ProtoRole", tag = "1")]
    pub role: i32,
    #[prost(uint64, tag = "2")]
    pub epoch: u64,
}
// ----- Shutdown -----

/// Empty
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoShutdownReq {}
/// Empty
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoShutdownResult {}
// ----- Replication stream -----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoStreamReq {
    #[prost(string, tag = "1")]
    pub requester_id: ::prost::alloc::string::String,
    #[prost(uint64, tag = "2")]
    pub epoch: u64,
    /// 0 means the requester's log is empty.
    #[prost(uint64, tag = "3")]
    pub after_sequence_number: u64,
    #[prost(uint64, tag = "4")]
    pub after_epoch: u64,
}
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProtoStreamMsg {
    /// Epoch of the primary serving the stream.
    #[prost(uint64, tag = "1")]
    pub epoch: u64,
    #[prost(uint64, tag = "2")]
    pub sequence_number: u64,
    /// Epoch the operation was written in.
    #[prost(uint64, tag = "3")]
    pub op_epoch: u64,
    #[prost(int64, tag = "4")]
    pub timestamp_millis: i64,
    #[prost(bytes = "vec", tag = "5")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtoRole {
    Uninitialized = 0,
    Secondary = 1,
    Primary = 2,
    Removed = 3,
}
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ProtoCommand {
    Unspecified = 0,
    Promote = 1,
    Demote = 2,
    Remove = 3,
}
#[doc = r" Generated client implementations."]
pub mod grpc_replica_client {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = " One service per node. Clients use Write/Read/Status/Shutdown, the cluster controller uses"]
    #[doc = " Control/Status/Shutdown, and secondaries pull the primary's operation log via StreamOperations."]
    pub struct GrpcReplicaClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl GrpcReplicaClient<tonic::transport::Channel> {
        #[doc = r" Attempt to create a new client by connecting to a given endpoint."]
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> GrpcReplicaClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::ResponseBody: Body + HttpBody + Send + 'static,
        T::Error: Into<StdError>,
        <T::ResponseBody as HttpBody>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = tonic::client::Grpc::with_interceptor(inner, interceptor);
            Self { inner }
        }
        pub async fn write(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoWriteReq>,
        ) -> Result<tonic::Response<super::ProtoWriteResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/replset.GrpcReplica/Write");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn read(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoReadReq>,
        ) -> Result<tonic::Response<super::ProtoReadResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/replset.GrpcReplica/Read");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn status(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoStatusReq>,
        ) -> Result<tonic::Response<super::ProtoStatusResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/replset.GrpcReplica/Status");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn control(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoControlReq>,
        ) -> Result<tonic::Response<super::ProtoControlResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/replset.GrpcReplica/Control");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn shutdown(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoShutdownReq>,
        ) -> Result<tonic::Response<super::ProtoShutdownResult>, tonic::Status> {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/replset.GrpcReplica/Shutdown");
            self.inner.unary(request.into_request(), path, codec).await
        }
        pub async fn stream_operations(
            &mut self,
            request: impl tonic::IntoRequest<super::ProtoStreamReq>,
        ) -> Result<tonic::Response<tonic::codec::Streaming<super::ProtoStreamMsg>>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::new(
                    tonic::Code::Unknown,
                    format!("Service was not ready: {}", e.into()),
                )
            })?;
            let codec = tonic::codec::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/replset.GrpcReplica/StreamOperations");
            self.inner
                .server_streaming(request.into_request(), path, codec)
                .await
        }
    }
    impl<T: Clone> Clone for GrpcReplicaClient<T> {
        fn clone(&self) -> Self {
            Self {
                inner: self.inner.clone(),
            }
        }
    }
    impl<T> std::fmt::Debug for GrpcReplicaClient<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "GrpcReplicaClient {{ ... }}")
        }
    }
}
#[doc = r" Generated server implementations."]
pub mod grpc_replica_server {
    #![allow(unused_variables, dead_code, missing_docs)]
    use tonic::codegen::*;
    #[doc = "Generated trait containing gRPC methods that should be implemented for use with GrpcReplicaServer."]
    #[async_trait]
    pub trait GrpcReplica: Send + Sync + 'static {
        async fn write(
            &self,
            request: tonic::Request<super::ProtoWriteReq>,
        ) -> Result<tonic::Response<super::ProtoWriteResult>, tonic::Status>;
        async fn read(
            &self,
            request: tonic::Request<super::ProtoReadReq>,
        ) -> Result<tonic::Response<super::ProtoReadResult>, tonic::Status>;
        async fn status(
            &self,
            request: tonic::Request<super::ProtoStatusReq>,
        ) -> Result<tonic::Response<super::ProtoStatusResult>, tonic::Status>;
        async fn control(
            &self,
            request: tonic::Request<super::ProtoControlReq>,
        ) -> Result<tonic::Response<super::ProtoControlResult>, tonic::Status>;
        async fn shutdown(
            &self,
            request: tonic::Request<super::ProtoShutdownReq>,
        ) -> Result<tonic::Response<super::ProtoShutdownResult>, tonic::Status>;
        #[doc = "Server streaming response type for the StreamOperations method."]
        type StreamOperationsStream: futures_core::Stream<Item = Result<super::ProtoStreamMsg, tonic::Status>>
            + Send
            + Sync
            + 'static;
        async fn stream_operations(
            &self,
            request: tonic::Request<super::ProtoStreamReq>,
        ) -> Result<tonic::Response<Self::StreamOperationsStream>, tonic::Status>;
    }
    #[doc = " One service per node. Clients use Write/Read/Status/Shutdown, the cluster controller uses"]
    #[doc = " Control/Status/Shutdown, and secondaries pull the primary's operation log via StreamOperations."]
    #[derive(Debug)]
    pub struct GrpcReplicaServer<T: GrpcReplica> {
        inner: _Inner<T>,
    }
    struct _Inner<T>(Arc<T>, Option<tonic::Interceptor>);
    impl<T: GrpcReplica> GrpcReplicaServer<T> {
        pub fn new(inner: T) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, None);
            Self { inner }
        }
        pub fn with_interceptor(inner: T, interceptor: impl Into<tonic::Interceptor>) -> Self {
            let inner = Arc::new(inner);
            let inner = _Inner(inner, Some(interceptor.into()));
            Self { inner }
        }
    }
    impl<T, B> Service<http::Request<B>> for GrpcReplicaServer<T>
    where
        T: GrpcReplica,
        B: HttpBody + Send + Sync + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = Never;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/replset.GrpcReplica/Write" => {
                    #[allow(non_camel_case_types)]
                    struct WriteSvc<T: GrpcReplica>(pub Arc<T>);
                    impl<T: GrpcReplica> tonic::server::UnaryService<super::ProtoWriteReq> for WriteSvc<T> {
                        type Response = super::ProtoWriteResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoWriteReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).write(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = WriteSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replset.GrpcReplica/Read" => {
                    #[allow(non_camel_case_types)]
                    struct ReadSvc<T: GrpcReplica>(pub Arc<T>);
                    impl<T: GrpcReplica> tonic::server::UnaryService<super::ProtoReadReq> for ReadSvc<T> {
                        type Response = super::ProtoReadResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoReadReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).read(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = ReadSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replset.GrpcReplica/Status" => {
                    #[allow(non_camel_case_types)]
                    struct StatusSvc<T: GrpcReplica>(pub Arc<T>);
                    impl<T: GrpcReplica> tonic::server::UnaryService<super::ProtoStatusReq> for StatusSvc<T> {
                        type Response = super::ProtoStatusResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoStatusReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).status(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = StatusSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replset.GrpcReplica/Control" => {
                    #[allow(non_camel_case_types)]
                    struct ControlSvc<T: GrpcReplica>(pub Arc<T>);
                    impl<T: GrpcReplica> tonic::server::UnaryService<super::ProtoControlReq> for ControlSvc<T> {
                        type Response = super::ProtoControlResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoControlReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).control(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = ControlSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replset.GrpcReplica/Shutdown" => {
                    #[allow(non_camel_case_types)]
                    struct ShutdownSvc<T: GrpcReplica>(pub Arc<T>);
                    impl<T: GrpcReplica> tonic::server::UnaryService<super::ProtoShutdownReq> for ShutdownSvc<T> {
                        type Response = super::ProtoShutdownResult;
                        type Future = BoxFuture<tonic::Response<Self::Response>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoShutdownReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).shutdown(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1.clone();
                        let inner = inner.0;
                        let method = ShutdownSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/replset.GrpcReplica/StreamOperations" => {
                    #[allow(non_camel_case_types)]
                    struct StreamOperationsSvc<T: GrpcReplica>(pub Arc<T>);
                    impl<T: GrpcReplica>
                        tonic::server::ServerStreamingService<super::ProtoStreamReq>
                        for StreamOperationsSvc<T>
                    {
                        type Response = super::ProtoStreamMsg;
                        type ResponseStream = T::StreamOperationsStream;
                        type Future =
                            BoxFuture<tonic::Response<Self::ResponseStream>, tonic::Status>;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::ProtoStreamReq>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).stream_operations(request).await };
                            Box::pin(fut)
                        }
                    }
                    let inner = self.inner.clone();
                    let fut = async move {
                        let interceptor = inner.1;
                        let inner = inner.0;
                        let method = StreamOperationsSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = if let Some(interceptor) = interceptor {
                            tonic::server::Grpc::with_interceptor(codec, interceptor)
                        } else {
                            tonic::server::Grpc::new(codec)
                        };
                        let res = grpc.server_streaming(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => Box::pin(async move {
                    Ok(http::Response::builder()
                        .status(200)
                        .header("grpc-status", "12")
                        .header("content-type", "application/grpc")
                        .body(tonic::body::BoxBody::empty())
                        .unwrap())
                }),
            }
        }
    }
    impl<T: GrpcReplica> Clone for GrpcReplicaServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self { inner }
        }
    }
    impl<T: GrpcReplica> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone(), self.1.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: GrpcReplica> tonic::transport::NamedService for GrpcReplicaServer<T> {
        const NAME: &'static str = "replset.GrpcReplica";
    }
}
