//! Configuration loading and management.
//!
//! This module provides structured configuration for fail2ban-gate,
//! including:
//! - Syslog ingestion (UDP listener and detection patterns)
//! - Proxy adapter listeners (SPOA, Envoy ext_authz, Nginx auth_request)
//! - Ban policy (thresholds, escalation, cleanup)
//! - Database-backed dynamic configuration
//! - Prometheus metrics endpoint

mod defaults;
mod types;
mod validation;

pub mod manager;

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

pub use manager::{ConfigManager, ConfigSource, DatabaseStatus};
pub use types::{
    BanConfig, DatabaseConfig, EnvoyConfig, MetricsConfig, NginxConfig, PatternRule, SpoaConfig,
    SyslogConfig,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Syslog ingestion settings and file-defined detection patterns.
    #[serde(default)]
    pub syslog: SyslogConfig,
    /// HAProxy SPOA adapter.
    #[serde(default)]
    pub spoa: SpoaConfig,
    /// Envoy ext_authz adapter.
    #[serde(default)]
    pub envoy: EnvoyConfig,
    /// Nginx auth_request adapter (also hosts the admin API).
    #[serde(default)]
    pub nginx: NginxConfig,
    /// Ban policy.
    #[serde(default)]
    pub ban: BanConfig,
    /// Database for persistent lists and dynamic configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Prometheus metrics endpoint.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_minimal_config() {
        let config: Config = toml::from_str("").expect("empty config should parse");
        assert_eq!(config.spoa.address.port(), 12345);
        assert_eq!(config.envoy.address.port(), 9001);
        assert_eq!(config.nginx.address.port(), 8888);
        assert_eq!(config.syslog.address.port(), 514);
    }

    #[test]
    fn parse_full_config() {
        let raw = r#"
            [syslog]
            address = "127.0.0.1:1514"

            [[syslog.patterns]]
            name = "dovecot-auth-failure"
            regex = "auth failed.*rip=([0-9.]+)"
            ip_group = 1
            severity = 3
            description = "Dovecot authentication failures"

            [spoa]
            address = "0.0.0.0:12400"
            max_clients = 32
            read_timeout_seconds = 5

            [ban]
            initial_ban_time_seconds = 60
            max_ban_time_seconds = 3600
            escalation_factor = 3.0
            max_attempts = 3
            time_window_seconds = 120
        "#;
        let config: Config = toml::from_str(raw).expect("config should parse");
        assert_eq!(config.syslog.patterns.len(), 1);
        assert_eq!(config.syslog.patterns[0].severity, 3);
        assert_eq!(config.spoa.max_clients, 32);
        assert_eq!(config.ban.max_attempts, 3);
        assert!(config.validate().is_ok());
    }
}
