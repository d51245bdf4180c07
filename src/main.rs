//! fail2ban-gate - IP reputation and ban decision engine for reverse
//! proxies.

use fail2ban_gate::adapters::envoy::EnvoyServer;
use fail2ban_gate::adapters::nginx::NginxServer;
use fail2ban_gate::adapters::spoa::SpoaServer;
use fail2ban_gate::adapters::Decider;
use fail2ban_gate::config::{Config, ConfigManager};
use fail2ban_gate::db::Database;
use fail2ban_gate::engine::BanEngine;
use fail2ban_gate::ingest::{PatternSet, SyslogReader};
use fail2ban_gate::lifecycle::Lifecycle;
use fail2ban_gate::{http, metrics};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Hard cap on the graceful shutdown phase; the process exits regardless
/// once this elapses.
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    let mut enabled: Vec<&str> = Vec::new();
    if config.spoa.enabled {
        enabled.push("spoa");
    }
    if config.envoy.enabled {
        enabled.push("envoy");
    }
    if config.nginx.enabled {
        enabled.push("nginx");
    }
    info!(protocols = ?enabled, "Starting fail2ban-gate");

    metrics::init();

    // Database is optional: without it the engine runs memory-only and the
    // persistent lists and dynamic config are unavailable.
    let database = if config.database.enabled {
        match Database::new(&config.database.path).await {
            Ok(db) => Some(db),
            Err(e) => {
                warn!(error = %e, "Failed to initialize database, continuing without persistent lists");
                None
            }
        }
    } else {
        None
    };

    // Ban engine: the one shared decision structure.
    let engine = BanEngine::new(config.ban.clone(), database.clone());

    // Active pattern set, shared between the syslog reader and the config
    // manager so dynamic reloads swap it in place.
    let patterns = Arc::new(RwLock::new(Arc::new(PatternSet::default())));
    let manager = ConfigManager::new(&config, database.clone(), Arc::clone(&engine), Arc::clone(&patterns));
    manager.initial_load().await;

    let lifecycle = Lifecycle::new();
    lifecycle.spawn_signal_handler();

    let decider: Decider = engine.clone();
    let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    // Syslog ingestion
    {
        let reader = SyslogReader::new(config.syslog.address, Arc::clone(&patterns), Arc::clone(&engine));
        let shutdown = lifecycle.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = reader.run(shutdown).await {
                error!(error = %e, "Syslog reader failed");
            }
        }));
    }

    // SPOA adapter
    if config.spoa.enabled {
        let server = SpoaServer::new(config.spoa.clone(), Arc::clone(&decider));
        let shutdown = lifecycle.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!(error = %e, "SPOA server failed");
            }
        }));
    }

    // Envoy ext_authz adapter
    if config.envoy.enabled {
        let server = EnvoyServer::new(config.envoy.clone(), Arc::clone(&decider));
        let shutdown = lifecycle.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!(error = %e, "Envoy ext_authz server failed");
            }
        }));
    }

    // Nginx auth_request adapter (hosts the admin API)
    if config.nginx.enabled {
        let server = NginxServer::new(
            config.nginx.clone(),
            Arc::clone(&decider),
            Arc::clone(&engine),
            database.clone(),
        );
        let shutdown = lifecycle.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(shutdown).await {
                error!(error = %e, "Nginx auth_request server failed");
            }
        }));
    }

    // Periodic cleanup (expired bans, idle ledger entries)
    {
        let engine = Arc::clone(&engine);
        let shutdown = lifecycle.subscribe();
        tasks.push(tokio::spawn(engine.run_cleanup(shutdown)));
    }

    // Dynamic configuration reload
    {
        let manager = Arc::clone(&manager);
        let shutdown = lifecycle.subscribe();
        tasks.push(tokio::spawn(manager.run(shutdown)));
    }

    // Prometheus metrics endpoint
    if config.metrics.enabled {
        let addr = config.metrics.address;
        let shutdown = lifecycle.subscribe();
        tasks.push(tokio::spawn(http::run_metrics_server(addr, shutdown)));
    }

    // Block until the signal handler broadcasts shutdown.
    let mut shutdown = lifecycle.subscribe();
    let _ = shutdown.recv().await;
    info!("Shutdown signal received, stopping services");

    let drain = async {
        for task in tasks {
            let _ = task.await;
        }
    };

    match tokio::time::timeout(SHUTDOWN_DEADLINE, drain).await {
        Ok(()) => info!("All services stopped gracefully"),
        Err(_) => warn!("Timeout waiting for services to stop"),
    }

    Ok(())
}
