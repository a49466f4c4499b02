//! Transport seam between the management client and the proxy.
//!
//! [`GrpcConnector`] is the production path: a tonic channel to the
//! loopback management port issuing hand-routed unary calls with a prost
//! codec. Tests substitute an in-memory connector (see
//! [`super::testing`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::Status;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

use crate::config::ManagementConfig;
use crate::error::ManagementError;
use crate::schema::{AddUserRequest, AddUserResponse, RemoveUserRequest, RemoveUserResponse};

/// Method names on the management service.
pub const ADD_USER_METHOD: &str = "AddUser";
pub const REMOVE_USER_METHOD: &str = "RemoveUser";

/// An established connection to the management service.
///
/// Implementations must be safe to call concurrently once ready.
#[async_trait]
pub trait HandlerConnection: Send + Sync {
    /// Check whether the connection can carry calls right now.
    async fn ready(&self) -> Result<(), ManagementError>;

    async fn add_user(&self, request: AddUserRequest) -> Result<AddUserResponse, Status>;

    async fn remove_user(&self, request: RemoveUserRequest)
    -> Result<RemoveUserResponse, Status>;
}

/// Opens connections to the management service.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn HandlerConnection>, ManagementError>;
}

// ============================================================================
// gRPC
// ============================================================================

/// Connects to the management service over plaintext HTTP/2.
pub struct GrpcConnector {
    endpoint: Endpoint,
    socket_target: String,
    service: Arc<str>,
    check_timeout: Duration,
}

impl GrpcConnector {
    /// Build a connector from validated management settings.
    ///
    /// # Errors
    ///
    /// Returns `ManagementError::Configuration` if the endpoint URI is invalid.
    pub fn new(config: &ManagementConfig) -> Result<Self, ManagementError> {
        let uri = config.endpoint_uri();
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| {
                ManagementError::Configuration(format!("invalid endpoint '{uri}': {e}"))
            })?
            .connect_timeout(config.ready_timeout)
            .tcp_nodelay(true);

        Ok(Self {
            endpoint,
            socket_target: config.socket_target(),
            service: Arc::from(config.handler_service.as_str()),
            check_timeout: config.ready_timeout,
        })
    }
}

#[async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self) -> Result<Arc<dyn HandlerConnection>, ManagementError> {
        let channel = self
            .endpoint
            .connect()
            .await
            .map_err(|e| ManagementError::Unavailable(format!("connect failed: {e}")))?;

        debug!(target = %self.socket_target, "Management channel connected");

        Ok(Arc::new(GrpcConnection {
            channel,
            socket_target: self.socket_target.clone(),
            service: self.service.clone(),
            check_timeout: self.check_timeout,
        }))
    }
}

/// A connected management channel.
///
/// `Channel` multiplexes concurrent calls, so every call clones it rather
/// than taking a lock.
struct GrpcConnection {
    channel: Channel,
    socket_target: String,
    service: Arc<str>,
    check_timeout: Duration,
}

impl GrpcConnection {
    async fn unary<Req, Resp>(&self, method: &str, request: Req) -> Result<Resp, Status>
    where
        Req: prost::Message + Send + Sync + 'static,
        Resp: prost::Message + Default + Send + Sync + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        grpc.ready()
            .await
            .map_err(|e| Status::unavailable(format!("management channel not ready: {e}")))?;

        let path = PathAndQuery::try_from(format!("/{}/{}", self.service, method))
            .map_err(|e| Status::internal(format!("invalid method path: {e}")))?;
        let codec: ProstCodec<Req, Resp> = ProstCodec::default();

        grpc.unary(tonic::Request::new(request), path, codec)
            .await
            .map(tonic::Response::into_inner)
    }
}

#[async_trait]
impl HandlerConnection for GrpcConnection {
    /// The channel reconnects lazily and reports ready even when the peer
    /// is gone, so readiness also requires a fresh TCP connect to the port.
    async fn ready(&self) -> Result<(), ManagementError> {
        tonic::client::Grpc::new(self.channel.clone())
            .ready()
            .await
            .map_err(|e| ManagementError::Unavailable(format!("channel not ready: {e}")))?;

        match tokio::time::timeout(
            self.check_timeout,
            tokio::net::TcpStream::connect(self.socket_target.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ManagementError::Unavailable(format!(
                "management port unreachable: {e}"
            ))),
            Err(_) => Err(ManagementError::Unavailable(
                "timed out probing management port".to_string(),
            )),
        }
    }

    async fn add_user(&self, request: AddUserRequest) -> Result<AddUserResponse, Status> {
        self.unary(ADD_USER_METHOD, request).await
    }

    async fn remove_user(
        &self,
        request: RemoveUserRequest,
    ) -> Result<RemoveUserResponse, Status> {
        self.unary(REMOVE_USER_METHOD, request).await
    }
}
