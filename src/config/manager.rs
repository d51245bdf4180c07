//! Dynamic configuration manager.
//!
//! Patterns and the ban policy can be edited in the database while the
//! daemon runs; a background task refreshes both on an interval. Failures
//! are never fatal after startup: the last successfully loaded set stays
//! active, the failure counter increments, and the status report flips to
//! disconnected until a reload succeeds again.

use crate::config::validation::{validate_ban_config, validate_patterns};
use crate::config::{BanConfig, Config, PatternRule};
use crate::db::{Database, DbError};
use crate::engine::BanEngine;
use crate::ingest::PatternSet;
use crate::metrics;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Where the active configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    File,
    Database,
    DatabaseCached,
}

/// Database connection status, reported through diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatus {
    pub enabled: bool,
    pub connected: bool,
    pub failure_count: u32,
    pub last_successful_load: Option<DateTime<Utc>>,
    pub has_cached_config: bool,
    pub patterns_source: ConfigSource,
    pub ban_config_source: ConfigSource,
}

#[derive(Debug)]
struct ManagerState {
    connected: bool,
    failure_count: u32,
    last_successful_load: Option<DateTime<Utc>>,
    /// Last known-good database rows, kept through later failures.
    cached_patterns: Option<Vec<PatternRule>>,
    cached_ban_config: Option<BanConfig>,
}

/// Manages the active pattern set and ban policy.
pub struct ConfigManager {
    database: Option<Database>,
    engine: Arc<BanEngine>,
    /// Shared with the syslog reader; a reload swaps the inner Arc.
    patterns: Arc<RwLock<Arc<PatternSet>>>,
    refresh_interval: std::time::Duration,
    max_retries: u32,
    retry_delay: std::time::Duration,
    database_enabled: bool,
    state: RwLock<ManagerState>,
}

impl ConfigManager {
    /// Create the manager and install the file-defined patterns as the
    /// initial active set.
    pub fn new(
        config: &Config,
        database: Option<Database>,
        engine: Arc<BanEngine>,
        patterns: Arc<RwLock<Arc<PatternSet>>>,
    ) -> Arc<Self> {
        let initial = PatternSet::compile(&config.syslog.patterns);
        metrics::PATTERNS_LOADED.set(initial.len() as i64);
        *patterns.write() = Arc::new(initial);

        Arc::new(Self {
            database,
            engine,
            patterns,
            refresh_interval: config.database.refresh_interval(),
            max_retries: config.database.max_retries,
            retry_delay: config.database.retry_delay(),
            database_enabled: config.database.enabled,
            state: RwLock::new(ManagerState {
                connected: false,
                failure_count: 0,
                last_successful_load: None,
                cached_patterns: None,
                cached_ban_config: None,
            }),
        })
    }

    /// Startup load: seed default rows into empty tables, then pull the
    /// first dynamic set. Failure falls back to the file configuration
    /// without aborting startup.
    pub async fn initial_load(&self) {
        let Some(db) = &self.database else {
            return;
        };

        if let Err(e) = db.dynamics().seed_defaults().await {
            warn!(error = %e, "Failed to seed default dynamic configuration");
        }

        if let Err(e) = self.load_from_database().await {
            warn!(error = %e, "Failed to load dynamic configuration, using file fallback");
        }
    }

    /// One reload pass: ping, fetch, validate, swap.
    async fn load_from_database(&self) -> Result<(), DbError> {
        let Some(db) = &self.database else {
            return Ok(());
        };

        if let Err(e) = db.ping().await {
            self.note_failure();
            metrics::CONFIG_RELOADS.with_label_values(&["database", "failure"]).inc();
            return Err(e);
        }

        let dynamics = db.dynamics();
        let patterns = match dynamics.get_patterns().await {
            Ok(patterns) => patterns,
            Err(e) => {
                self.note_failure();
                metrics::CONFIG_RELOADS.with_label_values(&["database", "failure"]).inc();
                return Err(e);
            }
        };
        let ban_row = match dynamics.get_ban_config().await {
            Ok(row) => row,
            Err(e) => {
                self.note_failure();
                metrics::CONFIG_RELOADS.with_label_values(&["database", "failure"]).inc();
                return Err(e);
            }
        };

        if !patterns.is_empty() {
            if let Err(e) = validate_patterns(&patterns) {
                warn!(error = %e, "Rejecting invalid pattern set from database");
                self.note_failure();
                metrics::CONFIG_RELOADS.with_label_values(&["database", "failure"]).inc();
                return Ok(());
            }

            let compiled = PatternSet::compile(&patterns);
            metrics::PATTERNS_LOADED.set(compiled.len() as i64);
            *self.patterns.write() = Arc::new(compiled);
            self.state.write().cached_patterns = Some(patterns.clone());
            info!(count = patterns.len(), "Loaded patterns from database");
        }

        if let Some(row) = ban_row {
            let policy: BanConfig = row.into();
            if let Err(e) = validate_ban_config(&policy) {
                warn!(error = %e, "Rejecting invalid ban config from database");
                self.note_failure();
                metrics::CONFIG_RELOADS.with_label_values(&["database", "failure"]).inc();
                return Ok(());
            }
            self.engine.update_policy(policy.clone());
            self.state.write().cached_ban_config = Some(policy);
            info!("Loaded ban configuration from database");
        }

        {
            let mut state = self.state.write();
            if !state.connected && state.failure_count > 0 {
                info!(
                    failures = state.failure_count,
                    "Database connection restored"
                );
            }
            state.connected = true;
            state.failure_count = 0;
            state.last_successful_load = Some(Utc::now());
        }
        metrics::CONFIG_RELOADS.with_label_values(&["database", "success"]).inc();

        Ok(())
    }

    fn note_failure(&self) {
        let mut state = self.state.write();
        state.connected = false;
        state.failure_count += 1;
        let has_cached = state.cached_patterns.is_some() || state.cached_ban_config.is_some();
        warn!(
            failures = state.failure_count,
            cached = has_cached,
            "Dynamic configuration reload failed, keeping previous configuration"
        );
    }

    /// Reload with bounded retries.
    pub async fn reload(&self) -> Result<(), DbError> {
        let mut last_err: Option<DbError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                info!(attempt, max = self.max_retries, "Retrying configuration reload");
                tokio::time::sleep(self.retry_delay).await;
            }
            match self.load_from_database().await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Periodic reload until shutdown. No-op when the database is disabled.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        if self.database.is_none() {
            return;
        }
        info!(interval = ?self.refresh_interval, "Configuration reload task started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.refresh_interval) => {
                    if let Err(e) = self.reload().await {
                        warn!(error = %e, "Configuration reload failed");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Configuration reload task stopping");
                    return;
                }
            }
        }
    }

    /// Current database status for diagnostics.
    pub fn database_status(&self) -> DatabaseStatus {
        let state = self.state.read();
        let has_cached = state.cached_patterns.is_some() || state.cached_ban_config.is_some();

        let source = |cached: bool| -> ConfigSource {
            if self.database_enabled && state.connected && cached {
                ConfigSource::Database
            } else if self.database_enabled && cached {
                ConfigSource::DatabaseCached
            } else {
                ConfigSource::File
            }
        };

        DatabaseStatus {
            enabled: self.database_enabled,
            connected: state.connected,
            failure_count: state.failure_count,
            last_successful_load: state.last_successful_load,
            has_cached_config: has_cached,
            patterns_source: source(state.cached_patterns.is_some()),
            ban_config_source: source(state.cached_ban_config.is_some()),
        }
    }
}
