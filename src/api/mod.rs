//! Admin HTTP API for manual ban management and inspection.
//!
//! Co-located on the nginx adapter's listener under `/api`. All responses
//! are JSON envelopes with at least `{success, message}`; list endpoints
//! add `count` and the items.

use crate::adapters::nginx::AppState;
use crate::db::{DbError, ListEntry};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::info;

/// Build the admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/ban", axum::routing::post(handle_ban))
        .route("/api/unban", axum::routing::post(handle_unban))
        .route(
            "/api/whitelist",
            get(handle_get_whitelist)
                .post(handle_add_whitelist)
                .delete(handle_remove_whitelist),
        )
        .route("/api/blacklist", get(handle_get_blacklist))
        .route("/api/temp-bans", get(handle_temp_bans))
        .route("/api/purge-bans", axum::routing::post(handle_purge_bans))
        .route("/api/radix-stats", get(handle_radix_stats))
}

// =============================================================================
// Request / response shapes
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub ip_address: String,
    /// Temporary ban length; defaults to the policy's initial ban time.
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    /// Permanent bans go to the blacklist instead of the ledger.
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize)]
pub struct UnbanRequest {
    pub ip_address: String,
    #[serde(default)]
    #[allow(dead_code)] // Accepted for audit logs; not acted upon.
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WhitelistRequest {
    pub ip_address: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize)]
struct BanResponse {
    success: bool,
    message: String,
    ip_address: String,
}

#[derive(Debug, Serialize)]
struct ListResponse {
    success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    message: String,
    count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    blacklist: Option<Vec<ListEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    whitelist: Option<Vec<ListEntry>>,
}

#[derive(Debug, Serialize)]
struct TempBanItem {
    ip_address: String,
    expires_at: DateTime<Utc>,
    duration_remaining_seconds: i64,
}

#[derive(Debug, Serialize)]
struct TempBanListResponse {
    success: bool,
    count: usize,
    temp_bans: Vec<TempBanItem>,
}

#[derive(Debug, Serialize)]
struct PurgeResponse {
    success: bool,
    message: String,
    purged_count: usize,
}

#[derive(Debug, Serialize)]
struct RadixStatsResponse {
    success: bool,
    stats: crate::engine::RadixStats,
}

fn ban_response(status: StatusCode, success: bool, message: String, ip: &str) -> Response {
    (
        status,
        Json(BanResponse {
            success,
            message,
            ip_address: ip.to_string(),
        }),
    )
        .into_response()
}

fn invalid_ip(ip: &str) -> Response {
    ban_response(
        StatusCode::BAD_REQUEST,
        false,
        format!("invalid IP address: {ip}"),
        ip,
    )
}

fn db_unavailable(ip: &str, operation: &str) -> Response {
    ban_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        false,
        format!("database not available for {operation}"),
        ip,
    )
}

// =============================================================================
// Ban / unban
// =============================================================================

/// POST /api/ban
async fn handle_ban(State(state): State<AppState>, Json(request): Json<BanRequest>) -> Response {
    if request.ip_address.parse::<IpAddr>().is_err() {
        return invalid_ip(&request.ip_address);
    }

    let created_by = request.created_by.as_deref().unwrap_or("api");
    let reason = request.reason.as_deref().unwrap_or("Manual ban via API");
    let ip = request.ip_address.as_str();

    if request.permanent {
        let Some(db) = &state.database else {
            return db_unavailable(ip, "permanent bans");
        };

        match db.lists().add_to_blacklist(ip, reason, created_by).await {
            Ok(()) => {
                info!(ip = %ip, reason = %reason, created_by = %created_by, "IP blacklisted via API");
                ban_response(
                    StatusCode::OK,
                    true,
                    format!("IP {ip} permanently banned (blacklisted)"),
                    ip,
                )
            }
            Err(DbError::AlreadyListed(_)) => ban_response(
                StatusCode::OK,
                true,
                format!("IP {ip} is already blacklisted"),
                ip,
            ),
            Err(e) => ban_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                format!("failed to add to blacklist: {e}"),
                ip,
            ),
        }
    } else {
        let duration = chrono::Duration::seconds(
            request
                .duration_seconds
                .unwrap_or_else(|| state.engine.policy().initial_ban_time_seconds)
                as i64,
        );

        match state.engine.manual_ban(ip, duration) {
            Ok(()) => ban_response(
                StatusCode::OK,
                true,
                format!("IP {ip} temporarily banned for {}s", duration.num_seconds()),
                ip,
            ),
            Err(e) => ban_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                false,
                format!("failed to add temporary ban: {e}"),
                ip,
            ),
        }
    }
}

/// POST /api/unban
async fn handle_unban(
    State(state): State<AppState>,
    Json(request): Json<UnbanRequest>,
) -> Response {
    if request.ip_address.parse::<IpAddr>().is_err() {
        return invalid_ip(&request.ip_address);
    }
    let ip = request.ip_address.as_str();

    match state.engine.manual_unban(ip).await {
        Ok(outcome) => {
            let message = if outcome.removed_from_blacklist {
                format!("IP {ip} removed from blacklist")
            } else {
                format!("IP {ip} removed from temporary bans")
            };
            ban_response(StatusCode::OK, true, message, ip)
        }
        Err(e) => ban_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            format!("failed to unban: {e}"),
            ip,
        ),
    }
}

// =============================================================================
// Persistent lists
// =============================================================================

/// POST /api/whitelist
async fn handle_add_whitelist(
    State(state): State<AppState>,
    Json(request): Json<WhitelistRequest>,
) -> Response {
    if request.ip_address.parse::<IpAddr>().is_err() {
        return invalid_ip(&request.ip_address);
    }
    let ip = request.ip_address.as_str();
    let Some(db) = &state.database else {
        return db_unavailable(ip, "whitelist operations");
    };

    let reason = request.reason.as_deref().unwrap_or("Manual whitelist via API");
    let created_by = request.created_by.as_deref().unwrap_or("api");

    match db.lists().add_to_whitelist(ip, reason, created_by).await {
        Ok(()) => ban_response(
            StatusCode::OK,
            true,
            format!("IP {ip} added to whitelist"),
            ip,
        ),
        Err(DbError::AlreadyListed(_)) => ban_response(
            StatusCode::OK,
            true,
            format!("IP {ip} is already whitelisted"),
            ip,
        ),
        Err(e) => ban_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            format!("failed to add to whitelist: {e}"),
            ip,
        ),
    }
}

/// DELETE /api/whitelist
async fn handle_remove_whitelist(
    State(state): State<AppState>,
    Json(request): Json<UnbanRequest>,
) -> Response {
    if request.ip_address.parse::<IpAddr>().is_err() {
        return invalid_ip(&request.ip_address);
    }
    let ip = request.ip_address.as_str();
    let Some(db) = &state.database else {
        return db_unavailable(ip, "whitelist operations");
    };

    match db.lists().remove_from_whitelist(ip).await {
        Ok(_) => ban_response(
            StatusCode::OK,
            true,
            format!("IP {ip} removed from whitelist"),
            ip,
        ),
        Err(e) => ban_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            false,
            format!("failed to remove from whitelist: {e}"),
            ip,
        ),
    }
}

/// GET /api/whitelist
async fn handle_get_whitelist(State(state): State<AppState>) -> Response {
    let Some(db) = &state.database else {
        return db_unavailable("", "whitelist operations");
    };

    match db.lists().get_whitelist().await {
        Ok(entries) => (
            StatusCode::OK,
            Json(ListResponse {
                success: true,
                message: String::new(),
                count: entries.len(),
                blacklist: None,
                whitelist: Some(entries),
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ListResponse {
                success: false,
                message: format!("failed to get whitelist: {e}"),
                count: 0,
                blacklist: None,
                whitelist: None,
            }),
        )
            .into_response(),
    }
}

/// GET /api/blacklist
async fn handle_get_blacklist(State(state): State<AppState>) -> Response {
    let Some(db) = &state.database else {
        return db_unavailable("", "blacklist operations");
    };

    match db.lists().get_blacklist().await {
        Ok(entries) => (
            StatusCode::OK,
            Json(ListResponse {
                success: true,
                message: String::new(),
                count: entries.len(),
                blacklist: Some(entries),
                whitelist: None,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ListResponse {
                success: false,
                message: format!("failed to get blacklist: {e}"),
                count: 0,
                blacklist: None,
                whitelist: None,
            }),
        )
            .into_response(),
    }
}

// =============================================================================
// Temporary ban inspection
// =============================================================================

/// GET /api/temp-bans
async fn handle_temp_bans(State(state): State<AppState>) -> Response {
    let now = Utc::now();
    let temp_bans: Vec<TempBanItem> = state
        .engine
        .list_currently_banned()
        .into_iter()
        .map(|(ip_address, expires_at)| TempBanItem {
            ip_address,
            expires_at,
            duration_remaining_seconds: (expires_at - now).num_seconds(),
        })
        .collect();

    (
        StatusCode::OK,
        Json(TempBanListResponse {
            success: true,
            count: temp_bans.len(),
            temp_bans,
        }),
    )
        .into_response()
}

/// POST /api/purge-bans
async fn handle_purge_bans(State(state): State<AppState>) -> Response {
    let purged_count = state.engine.purge_all_temporary_bans();
    (
        StatusCode::OK,
        Json(PurgeResponse {
            success: true,
            message: format!("Purged {purged_count} temporary bans"),
            purged_count,
        }),
    )
        .into_response()
}

/// GET /api/radix-stats
async fn handle_radix_stats(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(RadixStatsResponse {
            success: true,
            stats: state.engine.radix_stats(),
        }),
    )
        .into_response()
}
