//! Envoy ext_authz adapter.
//!
//! Implements the External Authorization v3 `Check` RPC against a trimmed,
//! wire-compatible proto surface (see `proto/extauthz.proto`). The decision
//! is carried inside `CheckResponse.status`: code OK allows, code
//! PERMISSION_DENIED denies. A request with no extractable client address
//! is allowed - the engine never fails closed on its own uncertainty.

use crate::adapters::Decider;
use crate::config::EnvoyConfig;
use crate::metrics;
use std::sync::Arc;
use tokio::sync::broadcast;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

pub mod proto {
    tonic::include_proto!("envoy.service.auth.v3");
}

use proto::authorization_server::{Authorization, AuthorizationServer};
use proto::{CheckRequest, CheckResponse, RpcStatus};

/// Deny message carried in the response status.
const DENY_MESSAGE: &str = "IP is banned due to suspicious activity";

/// ext_authz gRPC service.
pub struct ExtAuthzService {
    decider: Decider,
}

impl ExtAuthzService {
    pub fn new(decider: Decider) -> Self {
        Self { decider }
    }

    /// Extract the client address, in precedence order:
    /// x-forwarded-for (first element), x-real-ip, the source socket
    /// address, then the destination socket address.
    fn extract_client_ip(request: &CheckRequest) -> Option<String> {
        let attributes = request.attributes.as_ref()?;

        if let Some(http) = attributes
            .request
            .as_ref()
            .and_then(|request| request.http.as_ref())
        {
            if let Some(xff) = http.headers.get("x-forwarded-for") {
                if let Some(first) = xff.split(',').next() {
                    let first = first.trim();
                    if !first.is_empty() {
                        return Some(first.to_string());
                    }
                }
            }
            if let Some(real_ip) = http.headers.get("x-real-ip") {
                let real_ip = real_ip.trim();
                if !real_ip.is_empty() {
                    return Some(real_ip.to_string());
                }
            }
        }

        for peer in [attributes.source.as_ref(), attributes.destination.as_ref()]
            .into_iter()
            .flatten()
        {
            if let Some(socket) = peer
                .address
                .as_ref()
                .and_then(|address| address.socket_address.as_ref())
            {
                if !socket.address.is_empty() {
                    return Some(socket.address.clone());
                }
            }
        }

        None
    }

    fn allow_response() -> CheckResponse {
        CheckResponse {
            status: Some(RpcStatus {
                code: tonic::Code::Ok as i32,
                message: String::new(),
            }),
        }
    }

    fn deny_response(reason: &str) -> CheckResponse {
        CheckResponse {
            status: Some(RpcStatus {
                code: tonic::Code::PermissionDenied as i32,
                message: reason.to_string(),
            }),
        }
    }
}

#[tonic::async_trait]
impl Authorization for ExtAuthzService {
    async fn check(
        &self,
        request: Request<CheckRequest>,
    ) -> Result<Response<CheckResponse>, Status> {
        let Some(client_ip) = Self::extract_client_ip(request.get_ref()) else {
            warn!("Could not extract client IP from ext_authz request");
            return Ok(Response::new(Self::allow_response()));
        };

        let banned = self.decider.is_banned(&client_ip).await;
        metrics::record_decision("envoy", banned);

        if banned {
            debug!(ip = %client_ip, "Blocking banned IP via Envoy ext_authz");
            Ok(Response::new(Self::deny_response(DENY_MESSAGE)))
        } else {
            debug!(ip = %client_ip, "Allowing IP via Envoy ext_authz");
            Ok(Response::new(Self::allow_response()))
        }
    }
}

/// ext_authz gRPC server.
pub struct EnvoyServer {
    config: EnvoyConfig,
    decider: Decider,
}

impl EnvoyServer {
    pub fn new(config: EnvoyConfig, decider: Decider) -> Self {
        Self { config, decider }
    }

    /// Serve until shutdown; tonic drains in-flight RPCs on stop.
    pub async fn run(
        self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), tonic::transport::Error> {
        let service = ExtAuthzService::new(Arc::clone(&self.decider));

        info!(address = %self.config.address, "Envoy ext_authz server started");

        Server::builder()
            .add_service(AuthorizationServer::new(service))
            .serve_with_shutdown(self.config.address, async move {
                let _ = shutdown.recv().await;
                info!("Envoy ext_authz server stopping");
            })
            .await
    }
}
