/// /////////////////////////////////////////////////////////////////////////////////////////////////
/// Identifiers
/// /////////////////////////////////////////////////////////////////////////////////////////////////
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ApplicationIdProto {
    #[prost(uint64, tag = "1")]
    pub cluster_timestamp: u64,
    #[prost(uint32, tag = "2")]
    pub id: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DagIdProto {
    #[prost(message, optional, tag = "1")]
    pub application_id: ::core::option::Option<ApplicationIdProto>,
    #[prost(uint32, tag = "2")]
    pub id: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VertexIdProto {
    #[prost(message, optional, tag = "1")]
    pub dag_id: ::core::option::Option<DagIdProto>,
    #[prost(uint32, tag = "2")]
    pub id: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskIdProto {
    #[prost(message, optional, tag = "1")]
    pub vertex_id: ::core::option::Option<VertexIdProto>,
    #[prost(uint32, tag = "2")]
    pub id: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskAttemptIdProto {
    #[prost(message, optional, tag = "1")]
    pub task_id: ::core::option::Option<TaskIdProto>,
    #[prost(uint32, tag = "2")]
    pub id: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerIdProto {
    #[prost(message, optional, tag = "1")]
    pub application_id: ::core::option::Option<ApplicationIdProto>,
    #[prost(uint64, tag = "2")]
    pub id: u64,
}
/// /////////////////////////////////////////////////////////////////////////////////////////////////
/// Task shipping
/// /////////////////////////////////////////////////////////////////////////////////////////////////
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntityDescriptorProto {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IoDescriptorProto {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "2")]
    pub descriptor: ::core::option::Option<EntityDescriptorProto>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LocalResourceProto {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub url: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub size: u64,
    #[prost(uint64, tag = "4")]
    pub timestamp: u64,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TokenProto {
    #[prost(string, tag = "1")]
    pub alias: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub secret: ::prost::alloc::vec::Vec<u8>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CredentialsProto {
    #[prost(message, repeated, tag = "1")]
    pub tokens: ::prost::alloc::vec::Vec<TokenProto>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskSpecProto {
    #[prost(message, optional, tag = "1")]
    pub attempt_id: ::core::option::Option<TaskAttemptIdProto>,
    #[prost(string, tag = "2")]
    pub vertex_name: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "3")]
    pub processor: ::core::option::Option<EntityDescriptorProto>,
    #[prost(message, repeated, tag = "4")]
    pub inputs: ::prost::alloc::vec::Vec<IoDescriptorProto>,
    #[prost(message, repeated, tag = "5")]
    pub outputs: ::prost::alloc::vec::Vec<IoDescriptorProto>,
}
/// /////////////////////////////////////////////////////////////////////////////////////////////////
/// Worker events
/// /////////////////////////////////////////////////////////////////////////////////////////////////
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DataMovementEventProto {
    #[prost(uint32, tag = "1")]
    pub source_index: u32,
    #[prost(uint32, tag = "2")]
    pub target_index: u32,
    #[prost(uint32, tag = "3")]
    pub version: u32,
    #[prost(bytes = "vec", tag = "4")]
    pub user_payload: ::prost::alloc::vec::Vec<u8>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InputFailedEventProto {
    #[prost(uint32, tag = "1")]
    pub source_index: u32,
    #[prost(uint32, tag = "2")]
    pub target_index: u32,
    #[prost(uint32, tag = "3")]
    pub version: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InputReadErrorEventProto {
    #[prost(string, tag = "1")]
    pub diagnostics: ::prost::alloc::string::String,
    #[prost(uint32, tag = "2")]
    pub index: u32,
    #[prost(uint32, tag = "3")]
    pub version: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VertexManagerEventProto {
    #[prost(string, tag = "1")]
    pub target_vertex: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub user_payload: ::prost::alloc::vec::Vec<u8>,
}
/// Compact form that expands at the consumer into `count` data movement
/// events with target indices [source_index, source_index + count).
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CompositeDataMovementEventProto {
    #[prost(uint32, tag = "1")]
    pub source_index: u32,
    #[prost(uint32, tag = "2")]
    pub count: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub user_payload: ::prost::alloc::vec::Vec<u8>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CounterProto {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub value: i64,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CountersProto {
    #[prost(message, repeated, tag = "1")]
    pub counters: ::prost::alloc::vec::Vec<CounterProto>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskStatusUpdateEventProto {
    #[prost(float, tag = "1")]
    pub progress: f32,
    #[prost(message, optional, tag = "2")]
    pub counters: ::core::option::Option<CountersProto>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskAttemptCompletedEventProto {}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskAttemptFailedEventProto {
    #[prost(string, tag = "1")]
    pub diagnostics: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkerEventProto {
    #[prost(oneof = "worker_event_proto::Event", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub event: ::core::option::Option<worker_event_proto::Event>,
}
/// Nested message and enum types in `WorkerEventProto`.
pub mod worker_event_proto {
    #[allow(clippy::derive_partial_eq_without_eq)]
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Event {
        #[prost(message, tag = "1")]
        DataMovement(super::DataMovementEventProto),
        #[prost(message, tag = "2")]
        InputFailed(super::InputFailedEventProto),
        #[prost(message, tag = "3")]
        InputReadError(super::InputReadErrorEventProto),
        #[prost(message, tag = "4")]
        VertexManager(super::VertexManagerEventProto),
        #[prost(message, tag = "5")]
        CompositeDataMovement(super::CompositeDataMovementEventProto),
        #[prost(message, tag = "6")]
        TaskStatusUpdate(super::TaskStatusUpdateEventProto),
        #[prost(message, tag = "7")]
        TaskAttemptCompleted(super::TaskAttemptCompletedEventProto),
        #[prost(message, tag = "8")]
        TaskAttemptFailed(super::TaskAttemptFailedEventProto),
    }
}
/// /////////////////////////////////////////////////////////////////////////////////////////////////
/// Worker <-> AM protocol
/// /////////////////////////////////////////////////////////////////////////////////////////////////
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetTaskParams {
    #[prost(message, optional, tag = "1")]
    pub container_id: ::core::option::Option<ContainerIdProto>,
    #[prost(uint32, tag = "2")]
    pub pid: u32,
    #[prost(string, tag = "3")]
    pub hostname: ::prost::alloc::string::String,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ContainerTask {
    #[prost(bool, tag = "1")]
    pub should_die: bool,
    #[prost(message, optional, tag = "2")]
    pub task_spec: ::core::option::Option<TaskSpecProto>,
    #[prost(message, repeated, tag = "3")]
    pub additional_resources: ::prost::alloc::vec::Vec<LocalResourceProto>,
    #[prost(message, optional, tag = "4")]
    pub credentials: ::core::option::Option<CredentialsProto>,
    #[prost(bool, tag = "5")]
    pub credentials_changed: bool,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CanCommitParams {
    #[prost(message, optional, tag = "1")]
    pub attempt_id: ::core::option::Option<TaskAttemptIdProto>,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CanCommitResult {
    #[prost(bool, tag = "1")]
    pub can_commit: bool,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatParams {
    #[prost(message, optional, tag = "1")]
    pub container_id: ::core::option::Option<ContainerIdProto>,
    #[prost(int64, tag = "2")]
    pub request_id: i64,
    #[prost(message, optional, tag = "3")]
    pub current_attempt_id: ::core::option::Option<TaskAttemptIdProto>,
    #[prost(message, repeated, tag = "4")]
    pub events: ::prost::alloc::vec::Vec<WorkerEventProto>,
    #[prost(uint32, tag = "5")]
    pub events_start_index: u32,
    #[prost(uint32, tag = "6")]
    pub max_events: u32,
}
#[allow(clippy::derive_partial_eq_without_eq)]
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatResult {
    #[prost(int64, tag = "1")]
    pub last_request_id: i64,
    #[prost(message, repeated, tag = "2")]
    pub events: ::prost::alloc::vec::Vec<WorkerEventProto>,
    #[prost(bool, tag = "3")]
    pub should_die: bool,
}
/// Generated client implementations.
pub mod task_communicator_client {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;
    use tonic::codegen::http::Uri;
    #[derive(Debug, Clone)]
    pub struct TaskCommunicatorClient<T> {
        inner: tonic::client::Grpc<T>,
    }
    impl TaskCommunicatorClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: std::convert::TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }
    impl<T> TaskCommunicatorClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::BoxBody>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }
        pub fn with_origin(inner: T, origin: Uri) -> Self {
            let inner = tonic::client::Grpc::with_origin(inner, origin);
            Self { inner }
        }
        pub fn with_interceptor<F>(
            inner: T,
            interceptor: F,
        ) -> TaskCommunicatorClient<InterceptedService<T, F>>
        where
            F: tonic::service::Interceptor,
            T::ResponseBody: Default,
            T: tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
                Response = http::Response<
                    <T as tonic::client::GrpcService<tonic::body::BoxBody>>::ResponseBody,
                >,
            >,
            <T as tonic::codegen::Service<
                http::Request<tonic::body::BoxBody>,
            >>::Error: Into<StdError> + Send + Sync,
        {
            TaskCommunicatorClient::new(InterceptedService::new(inner, interceptor))
        }
        /// Compress requests with the given encoding.
        ///
        /// This requires the server to support it otherwise it might respond with an
        /// error.
        #[must_use]
        pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.inner = self.inner.send_compressed(encoding);
            self
        }
        /// Enable decompressing responses.
        #[must_use]
        pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.inner = self.inner.accept_compressed(encoding);
            self
        }
        /// Workers poll for the task assigned to their container.
        pub async fn get_task(
            &mut self,
            request: impl tonic::IntoRequest<super::GetTaskParams>,
        ) -> Result<tonic::Response<super::ContainerTask>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/arbalest.protobuf.TaskCommunicator/GetTask",
            );
            self.inner.unary(request.into_request(), path, codec).await
        }
        /// Commit go/no-go arbitration; granted to exactly one attempt per task.
        pub async fn can_commit(
            &mut self,
            request: impl tonic::IntoRequest<super::CanCommitParams>,
        ) -> Result<tonic::Response<super::CanCommitResult>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/arbalest.protobuf.TaskCommunicator/CanCommit",
            );
            self.inner.unary(request.into_request(), path, codec).await
        }
        /// Periodic worker heartbeat carrying events in both directions.
        pub async fn heartbeat(
            &mut self,
            request: impl tonic::IntoRequest<super::HeartbeatParams>,
        ) -> Result<tonic::Response<super::HeartbeatResult>, tonic::Status> {
            self.inner
                .ready()
                .await
                .map_err(|e| {
                    tonic::Status::new(
                        tonic::Code::Unknown,
                        format!("Service was not ready: {}", e.into()),
                    )
                })?;
            let codec = tonic::codec::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static(
                "/arbalest.protobuf.TaskCommunicator/Heartbeat",
            );
            self.inner.unary(request.into_request(), path, codec).await
        }
    }
}
/// Generated server implementations.
pub mod task_communicator_server {
    #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
    use tonic::codegen::*;
    /// Generated trait containing gRPC methods that should be implemented for use with TaskCommunicatorServer.
    #[async_trait]
    pub trait TaskCommunicator: Send + Sync + 'static {
        /// Workers poll for the task assigned to their container.
        async fn get_task(
            &self,
            request: tonic::Request<super::GetTaskParams>,
        ) -> Result<tonic::Response<super::ContainerTask>, tonic::Status>;
        /// Commit go/no-go arbitration; granted to exactly one attempt per task.
        async fn can_commit(
            &self,
            request: tonic::Request<super::CanCommitParams>,
        ) -> Result<tonic::Response<super::CanCommitResult>, tonic::Status>;
        /// Periodic worker heartbeat carrying events in both directions.
        async fn heartbeat(
            &self,
            request: tonic::Request<super::HeartbeatParams>,
        ) -> Result<tonic::Response<super::HeartbeatResult>, tonic::Status>;
    }
    #[derive(Debug)]
    pub struct TaskCommunicatorServer<T: TaskCommunicator> {
        inner: _Inner<T>,
        accept_compression_encodings: EnabledCompressionEncodings,
        send_compression_encodings: EnabledCompressionEncodings,
    }
    struct _Inner<T>(Arc<T>);
    impl<T: TaskCommunicator> TaskCommunicatorServer<T> {
        pub fn new(inner: T) -> Self {
            Self::from_arc(Arc::new(inner))
        }
        pub fn from_arc(inner: Arc<T>) -> Self {
            let inner = _Inner(inner);
            Self {
                inner,
                accept_compression_encodings: Default::default(),
                send_compression_encodings: Default::default(),
            }
        }
        pub fn with_interceptor<F>(
            inner: T,
            interceptor: F,
        ) -> InterceptedService<Self, F>
        where
            F: tonic::service::Interceptor,
        {
            InterceptedService::new(Self::new(inner), interceptor)
        }
        /// Enable decompressing requests with the given encoding.
        #[must_use]
        pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.accept_compression_encodings.enable(encoding);
            self
        }
        /// Compress responses with the given encoding, if the client supports it.
        #[must_use]
        pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.send_compression_encodings.enable(encoding);
            self
        }
    }
    impl<T, B> tonic::codegen::Service<http::Request<B>> for TaskCommunicatorServer<T>
    where
        T: TaskCommunicator,
        B: Body + Send + 'static,
        B::Error: Into<StdError> + Send + 'static,
    {
        type Response = http::Response<tonic::body::BoxBody>;
        type Error = std::convert::Infallible;
        type Future = BoxFuture<Self::Response, Self::Error>;
        fn poll_ready(
            &mut self,
            _cx: &mut Context<'_>,
        ) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
        fn call(&mut self, req: http::Request<B>) -> Self::Future {
            let inner = self.inner.clone();
            match req.uri().path() {
                "/arbalest.protobuf.TaskCommunicator/GetTask" => {
                    #[allow(non_camel_case_types)]
                    struct GetTaskSvc<T: TaskCommunicator>(pub Arc<T>);
                    impl<
                        T: TaskCommunicator,
                    > tonic::server::UnaryService<super::GetTaskParams>
                    for GetTaskSvc<T> {
                        type Response = super::ContainerTask;
                        type Future = BoxFuture<
                            tonic::Response<Self::Response>,
                            tonic::Status,
                        >;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::GetTaskParams>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).get_task(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = GetTaskSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec)
                            .apply_compression_config(
                                accept_compression_encodings,
                                send_compression_encodings,
                            );
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/arbalest.protobuf.TaskCommunicator/CanCommit" => {
                    #[allow(non_camel_case_types)]
                    struct CanCommitSvc<T: TaskCommunicator>(pub Arc<T>);
                    impl<
                        T: TaskCommunicator,
                    > tonic::server::UnaryService<super::CanCommitParams>
                    for CanCommitSvc<T> {
                        type Response = super::CanCommitResult;
                        type Future = BoxFuture<
                            tonic::Response<Self::Response>,
                            tonic::Status,
                        >;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::CanCommitParams>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).can_commit(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = CanCommitSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec)
                            .apply_compression_config(
                                accept_compression_encodings,
                                send_compression_encodings,
                            );
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                "/arbalest.protobuf.TaskCommunicator/Heartbeat" => {
                    #[allow(non_camel_case_types)]
                    struct HeartbeatSvc<T: TaskCommunicator>(pub Arc<T>);
                    impl<
                        T: TaskCommunicator,
                    > tonic::server::UnaryService<super::HeartbeatParams>
                    for HeartbeatSvc<T> {
                        type Response = super::HeartbeatResult;
                        type Future = BoxFuture<
                            tonic::Response<Self::Response>,
                            tonic::Status,
                        >;
                        fn call(
                            &mut self,
                            request: tonic::Request<super::HeartbeatParams>,
                        ) -> Self::Future {
                            let inner = self.0.clone();
                            let fut = async move { (*inner).heartbeat(request).await };
                            Box::pin(fut)
                        }
                    }
                    let accept_compression_encodings = self.accept_compression_encodings;
                    let send_compression_encodings = self.send_compression_encodings;
                    let inner = self.inner.clone();
                    let fut = async move {
                        let inner = inner.0;
                        let method = HeartbeatSvc(inner);
                        let codec = tonic::codec::ProstCodec::default();
                        let mut grpc = tonic::server::Grpc::new(codec)
                            .apply_compression_config(
                                accept_compression_encodings,
                                send_compression_encodings,
                            );
                        let res = grpc.unary(method, req).await;
                        Ok(res)
                    };
                    Box::pin(fut)
                }
                _ => {
                    Box::pin(async move {
                        Ok(
                            http::Response::builder()
                                .status(200)
                                .header("grpc-status", "12")
                                .header("content-type", "application/grpc")
                                .body(empty_body())
                                .unwrap(),
                        )
                    })
                }
            }
        }
    }
    impl<T: TaskCommunicator> Clone for TaskCommunicatorServer<T> {
        fn clone(&self) -> Self {
            let inner = self.inner.clone();
            Self {
                inner,
                accept_compression_encodings: self.accept_compression_encodings,
                send_compression_encodings: self.send_compression_encodings,
            }
        }
    }
    impl<T: TaskCommunicator> Clone for _Inner<T> {
        fn clone(&self) -> Self {
            Self(self.0.clone())
        }
    }
    impl<T: std::fmt::Debug> std::fmt::Debug for _Inner<T> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self.0)
        }
    }
    impl<T: TaskCommunicator> tonic::server::NamedService for TaskCommunicatorServer<T> {
        const NAME: &'static str = "arbalest.protobuf.TaskCommunicator";
    }
}
