//! Nginx auth_request adapter.
//!
//! HTTP server whose `/auth` status code gates the fronting request:
//! 200 allows, 403 denies. Decision metadata travels in `X-Fail2ban-*`
//! response headers so nginx can forward or log it. The admin API is
//! co-located on this listener under `/api`.

use crate::adapters::Decider;
use crate::api;
use crate::config::NginxConfig;
use crate::db::Database;
use crate::engine::BanEngine;
use crate::metrics;
use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{any, get};
use axum::Router;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Service identifier attached to every response.
const SERVICE_NAME: &str = "fail2ban-nginx-auth";

/// Reason text attached to deny responses.
const DENY_REASON: &str = "IP banned due to suspicious activity";

/// Shared state for the auth routes and the admin API.
#[derive(Clone)]
pub struct AppState {
    pub decider: Decider,
    pub engine: Arc<BanEngine>,
    pub database: Option<Database>,
    pub return_json: bool,
}

/// Nginx auth_request HTTP server.
pub struct NginxServer {
    config: NginxConfig,
    state: AppState,
}

impl NginxServer {
    pub fn new(
        config: NginxConfig,
        decider: Decider,
        engine: Arc<BanEngine>,
        database: Option<Database>,
    ) -> Self {
        let state = AppState {
            decider,
            engine,
            database,
            return_json: config.return_json,
        };
        Self { config, state }
    }

    /// Build the router: `/auth`, `/health`, and (when enabled) the admin
    /// API under `/api`.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/auth", any(handle_auth))
            .route("/health", get(handle_health));

        if self.config.enable_api {
            router = router.merge(api::router());
        }

        // One deadline covering request read and response write.
        let deadline = self.config.read_timeout() + self.config.write_timeout();

        router
            .with_state(self.state.clone())
            .layer(TimeoutLayer::new(deadline))
            .layer(TraceLayer::new_for_http())
    }

    /// Grace period for in-flight requests once shutdown is signalled.
    const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

    /// Serve until shutdown, letting in-flight requests complete for up to
    /// the grace period.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.config.address).await?;
        info!(address = %self.config.address, "Nginx auth_request server started");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        let mut grace_trigger = shutdown.resubscribe();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("Nginx auth_request server stopping");
        });

        tokio::select! {
            result = serve => result,
            _ = async {
                let _ = grace_trigger.recv().await;
                tokio::time::sleep(Self::SHUTDOWN_GRACE).await;
            } => Ok(()),
        }
    }
}

/// GET/any /auth - the authorization subrequest endpoint.
async fn handle_auth(
    State(state): State<AppState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(client_ip) = extract_client_ip(&headers, Some(remote)) else {
        warn!(remote = %remote, "Could not extract client IP from auth request");
        // No determinable subject: allow, reporting whatever the transport
        // supplied. Depending on fronting, this can expose a private
        // address in X-Fail2ban-IP.
        return allow_response(&remote.ip().to_string());
    };

    let banned = state.decider.is_banned(&client_ip).await;
    metrics::record_decision("nginx", banned);

    if banned {
        debug!(ip = %client_ip, "Blocking banned IP via nginx auth_request");
        deny_response(&client_ip, DENY_REASON, state.return_json)
    } else {
        debug!(ip = %client_ip, "Allowing IP via nginx auth_request");
        allow_response(&client_ip)
    }
}

/// GET /health - liveness probe.
async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "healthy", "service": SERVICE_NAME}))
}

/// Extract the client address, in precedence order:
/// X-Original-IP, X-Forwarded-For (first element), X-Real-IP, X-Client-IP,
/// CF-Connecting-IP, then the transport remote address.
pub fn extract_client_ip(headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(ip) = header_value("x-original-ip") {
        return Some(ip.to_string());
    }
    if let Some(xff) = header_value("x-forwarded-for") {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }
    for name in ["x-real-ip", "x-client-ip", "cf-connecting-ip"] {
        if let Some(ip) = header_value(name) {
            return Some(ip.to_string());
        }
    }

    remote.map(|addr| addr.ip().to_string())
}

fn allow_response(client_ip: &str) -> Response {
    let builder = Response::builder()
        .status(StatusCode::OK)
        .header("X-Fail2ban-Status", "allowed")
        .header("X-Fail2ban-IP", client_ip)
        .header("X-Fail2ban-Service", SERVICE_NAME);

    builder
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::OK.into_response())
}

fn deny_response(client_ip: &str, reason: &str, return_json: bool) -> Response {
    let mut builder = Response::builder()
        .status(StatusCode::FORBIDDEN)
        .header("X-Fail2ban-Status", "denied")
        .header("X-Fail2ban-IP", client_ip)
        .header("X-Fail2ban-Reason", reason)
        .header("X-Fail2ban-Service", SERVICE_NAME);

    let body = if return_json {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(
            json!({"error": "access_denied", "reason": reason, "ip": client_ip}).to_string(),
        )
    } else {
        Body::empty()
    };

    builder
        .body(body)
        .unwrap_or_else(|_| StatusCode::FORBIDDEN.into_response())
}
