//! Default values for configuration fields.

use std::net::SocketAddr;

pub(super) fn default_true() -> bool {
    true
}

pub(super) fn default_syslog_address() -> SocketAddr {
    "127.0.0.1:514".parse().expect("valid default address")
}

pub(super) fn default_spoa_address() -> SocketAddr {
    "0.0.0.0:12345".parse().expect("valid default address")
}

pub(super) fn default_envoy_address() -> SocketAddr {
    "0.0.0.0:9001".parse().expect("valid default address")
}

pub(super) fn default_nginx_address() -> SocketAddr {
    "0.0.0.0:8888".parse().expect("valid default address")
}

pub(super) fn default_metrics_address() -> SocketAddr {
    "0.0.0.0:9090".parse().expect("valid default address")
}

pub(super) fn default_max_clients() -> usize {
    100
}

pub(super) fn default_spoa_read_timeout() -> u64 {
    30
}

pub(super) fn default_nginx_timeout() -> u64 {
    10
}

pub(super) fn default_initial_ban_time() -> u64 {
    300 // 5 minutes
}

pub(super) fn default_max_ban_time() -> u64 {
    86_400 // 24 hours
}

pub(super) fn default_escalation_factor() -> f64 {
    2.0
}

pub(super) fn default_max_attempts() -> u32 {
    5
}

pub(super) fn default_time_window() -> u64 {
    600 // 10 minutes
}

pub(super) fn default_cleanup_interval() -> u64 {
    60
}

pub(super) fn default_max_memory_ttl() -> u64 {
    259_200 // 72 hours
}

pub(super) fn default_database_path() -> String {
    "fail2ban-gate.db".to_string()
}

pub(super) fn default_refresh_interval() -> u64 {
    30
}

pub(super) fn default_max_retries() -> u32 {
    3
}

pub(super) fn default_retry_delay() -> u64 {
    5
}

pub(super) fn default_ip_group() -> usize {
    1
}

pub(super) fn default_severity() -> i32 {
    1
}
