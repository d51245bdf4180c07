//! fail2ban-gate - centralized IP reputation and ban decision engine for
//! reverse proxies.
//!
//! Ingests syslog-style log lines over UDP, extracts offending client
//! addresses with operator-defined patterns, escalates repeat offenders
//! through progressively longer bans, and answers is-this-address-banned
//! queries over three proxy authorization protocols:
//!
//! - **HAProxy SPOA** - line-oriented TCP dialect
//! - **Envoy ext_authz** - gRPC authorization service
//! - **Nginx auth_request** - HTTP 200/403 endpoint
//!
//! Permanent blacklist/whitelist overrides live in SQLite alongside
//! dynamic detection patterns and ban policy; a small admin HTTP API
//! exposes manual ban/unban and inspection.

pub mod adapters;
pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod metrics;
