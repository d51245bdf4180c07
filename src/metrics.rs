//! Prometheus metrics collection.
//!
//! Tracks decision traffic per adapter, ban activity, pattern matching,
//! and dynamic configuration reloads. Exposed on the `/metrics` HTTP
//! endpoint for scraping.

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry for all metrics.
    pub static ref REGISTRY: Registry = Registry::new();

    /// Decisions served, labeled by adapter and outcome.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref DECISIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fail2ban_requests_total", "Decision requests processed by service and result"),
        &["service", "result"]
    ).expect("DECISIONS_TOTAL metric creation failed");

    /// Total bans applied by the engine (threshold crossings and manual bans).
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref BANS_TOTAL: IntCounter = IntCounter::new(
        "fail2ban_bans_total",
        "Total number of bans applied"
    ).expect("BANS_TOTAL metric creation failed");

    /// Applied ban durations. Buckets span 5 minutes to 72 hours.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref BAN_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("fail2ban_ban_duration_seconds", "Duration of applied bans in seconds")
            .buckets(vec![300.0, 600.0, 1800.0, 3600.0, 7200.0, 14400.0, 28800.0, 86400.0, 172800.0, 259200.0])
    ).expect("BAN_DURATION_SECONDS metric creation failed");

    /// Currently banned addresses (updated by the cleanup task).
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref CURRENTLY_BANNED: IntGauge = IntGauge::new(
        "fail2ban_current_bans",
        "Current number of banned addresses"
    ).expect("CURRENTLY_BANNED metric creation failed");

    /// Pattern matches, labeled by rule name and severity.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref PATTERN_MATCHES: IntCounterVec = IntCounterVec::new(
        Opts::new("fail2ban_pattern_matches_total", "Pattern matches by rule and severity"),
        &["pattern", "severity"]
    ).expect("PATTERN_MATCHES metric creation failed");

    /// Dynamic configuration reload attempts by source and status.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref CONFIG_RELOADS: IntCounterVec = IntCounterVec::new(
        Opts::new("fail2ban_config_reloads_total", "Configuration reloads by source and status"),
        &["source", "status"]
    ).expect("CONFIG_RELOADS metric creation failed");

    /// Detection patterns currently loaded.
    // SAFETY: Metrics init at startup via lazy_static, panic acceptable if prometheus fails
    pub static ref PATTERNS_LOADED: IntGauge = IntGauge::new(
        "fail2ban_config_patterns_loaded",
        "Number of patterns currently loaded"
    ).expect("PATTERNS_LOADED metric creation failed");
}

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at startup before any metrics are recorded.
pub fn init() {
    if let Err(e) = REGISTRY.register(Box::new(DECISIONS_TOTAL.clone())) {
        tracing::warn!(error = %e, "Failed to register metric fail2ban_requests_total");
    }
    if let Err(e) = REGISTRY.register(Box::new(BANS_TOTAL.clone())) {
        tracing::warn!(error = %e, "Failed to register metric fail2ban_bans_total");
    }
    if let Err(e) = REGISTRY.register(Box::new(BAN_DURATION_SECONDS.clone())) {
        tracing::warn!(error = %e, "Failed to register metric fail2ban_ban_duration_seconds");
    }
    if let Err(e) = REGISTRY.register(Box::new(CURRENTLY_BANNED.clone())) {
        tracing::warn!(error = %e, "Failed to register metric fail2ban_current_bans");
    }
    if let Err(e) = REGISTRY.register(Box::new(PATTERN_MATCHES.clone())) {
        tracing::warn!(error = %e, "Failed to register metric fail2ban_pattern_matches_total");
    }
    if let Err(e) = REGISTRY.register(Box::new(CONFIG_RELOADS.clone())) {
        tracing::warn!(error = %e, "Failed to register metric fail2ban_config_reloads_total");
    }
    if let Err(e) = REGISTRY.register(Box::new(PATTERNS_LOADED.clone())) {
        tracing::warn!(error = %e, "Failed to register metric fail2ban_config_patterns_loaded");
    }
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

/// Record one served decision.
#[inline]
pub fn record_decision(service: &str, banned: bool) {
    let result = if banned { "denied" } else { "allowed" };
    DECISIONS_TOTAL.with_label_values(&[service, result]).inc();
}
