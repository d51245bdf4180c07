//! Configuration type definitions.
//!
//! All the sub-config structs used by the main Config. Durations are plain
//! `*_seconds` integers, mirroring the columns of the `ban_config` table.

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::defaults::{
    default_cleanup_interval, default_database_path, default_envoy_address,
    default_escalation_factor, default_initial_ban_time, default_ip_group, default_max_attempts,
    default_max_ban_time, default_max_clients, default_max_memory_ttl, default_max_retries,
    default_metrics_address, default_nginx_address, default_nginx_timeout, default_refresh_interval,
    default_retry_delay, default_severity, default_spoa_address, default_spoa_read_timeout,
    default_syslog_address, default_time_window, default_true,
};

// =============================================================================
// Detection Patterns
// =============================================================================

/// A named detection rule applied to every ingested log line.
///
/// `ip_group` is the 1-based regex capture group holding the offending
/// address. Severity ranges 1..6: 1-2 light, 3-4 auth failure, 5-6 brute
/// force.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PatternRule {
    /// Unique rule name (used in logs and metrics labels).
    pub name: String,
    /// Regular expression matched against the raw log line.
    pub regex: String,
    /// 1-based capture group holding the client address.
    #[serde(default = "default_ip_group")]
    pub ip_group: usize,
    /// Violation severity (1..6).
    #[serde(default = "default_severity")]
    pub severity: i32,
    /// Human-readable description, recorded with each violation.
    #[serde(default)]
    pub description: String,
    /// Disabled rules are skipped without being removed.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

// =============================================================================
// Syslog Ingestion
// =============================================================================

/// Syslog UDP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyslogConfig {
    /// UDP address to receive log datagrams on.
    #[serde(default = "default_syslog_address")]
    pub address: SocketAddr,
    /// File-defined detection patterns. When the database is enabled, rows
    /// from the `patterns` table replace these on reload.
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
}

impl Default for SyslogConfig {
    fn default() -> Self {
        Self {
            address: default_syslog_address(),
            patterns: Vec::new(),
        }
    }
}

// =============================================================================
// Adapter Listeners
// =============================================================================

/// HAProxy SPOA adapter configuration (line-based TCP dialect).
#[derive(Debug, Clone, Deserialize)]
pub struct SpoaConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// TCP address to listen on.
    #[serde(default = "default_spoa_address")]
    pub address: SocketAddr,
    /// Maximum concurrent client connections.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    /// Per-connection read deadline; expiry closes the connection.
    #[serde(default = "default_spoa_read_timeout")]
    pub read_timeout_seconds: u64,
}

impl SpoaConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }
}

impl Default for SpoaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_spoa_address(),
            max_clients: default_max_clients(),
            read_timeout_seconds: default_spoa_read_timeout(),
        }
    }
}

/// Envoy ext_authz gRPC adapter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvoyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// gRPC address to listen on.
    #[serde(default = "default_envoy_address")]
    pub address: SocketAddr,
}

impl Default for EnvoyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_envoy_address(),
        }
    }
}

/// Nginx auth_request HTTP adapter configuration.
///
/// The admin API is co-located on this listener under `/api`.
#[derive(Debug, Clone, Deserialize)]
pub struct NginxConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP address to listen on.
    #[serde(default = "default_nginx_address")]
    pub address: SocketAddr,
    /// Request read deadline.
    #[serde(default = "default_nginx_timeout")]
    pub read_timeout_seconds: u64,
    /// Response write deadline.
    #[serde(default = "default_nginx_timeout")]
    pub write_timeout_seconds: u64,
    /// Attach a JSON error body to 403 responses.
    #[serde(default)]
    pub return_json: bool,
    /// Serve the admin API routes under /api.
    #[serde(default = "default_true")]
    pub enable_api: bool,
}

impl NginxConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_seconds)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_seconds)
    }
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_nginx_address(),
            read_timeout_seconds: default_nginx_timeout(),
            write_timeout_seconds: default_nginx_timeout(),
            return_json: false,
            enable_api: true,
        }
    }
}

// =============================================================================
// Ban Policy
// =============================================================================

/// Ban policy: detection threshold, escalation curve, and cleanup cadence.
///
/// This is both a config file section and the runtime policy handed to the
/// ban engine; when the database is enabled, the newest enabled `ban_config`
/// row replaces the file values on reload.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BanConfig {
    /// Duration of the first ban.
    #[serde(default = "default_initial_ban_time")]
    pub initial_ban_time_seconds: u64,
    /// Upper bound on any ban duration.
    #[serde(default = "default_max_ban_time")]
    pub max_ban_time_seconds: u64,
    /// Multiplier applied together with the per-address ban count.
    #[serde(default = "default_escalation_factor")]
    pub escalation_factor: f64,
    /// In-window violations required to trigger a ban.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Sliding window over which violations are counted.
    #[serde(default = "default_time_window")]
    pub time_window_seconds: u64,
    /// How often expired state is swept.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
    /// Entries idle for this long (and not banned) are evicted.
    #[serde(default = "default_max_memory_ttl")]
    pub max_memory_ttl_seconds: u64,
}

impl BanConfig {
    pub fn initial_ban_time(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.initial_ban_time_seconds as i64)
    }

    pub fn max_ban_time(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_ban_time_seconds as i64)
    }

    pub fn time_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.time_window_seconds as i64)
    }

    pub fn max_memory_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.max_memory_ttl_seconds as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl Default for BanConfig {
    fn default() -> Self {
        Self {
            initial_ban_time_seconds: default_initial_ban_time(),
            max_ban_time_seconds: default_max_ban_time(),
            escalation_factor: default_escalation_factor(),
            max_attempts: default_max_attempts(),
            time_window_seconds: default_time_window(),
            cleanup_interval_seconds: default_cleanup_interval(),
            max_memory_ttl_seconds: default_max_memory_ttl(),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Database configuration for persistent lists and dynamic config.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Disabled means: no persistent lists, no dynamic config reload.
    #[serde(default)]
    pub enabled: bool,
    /// Path to the SQLite database file (":memory:" for tests).
    #[serde(default = "default_database_path")]
    pub path: String,
    /// How often patterns and ban policy are refreshed from the database.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
    /// Reload retry attempts before giving up until the next interval.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between reload retries.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
}

impl DatabaseConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_database_path(),
            refresh_interval_seconds: default_refresh_interval(),
            max_retries: default_max_retries(),
            retry_delay_seconds: default_retry_delay(),
        }
    }
}

// =============================================================================
// Metrics
// =============================================================================

/// Prometheus metrics endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// HTTP address serving /metrics.
    #[serde(default = "default_metrics_address")]
    pub address: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_metrics_address(),
        }
    }
}
