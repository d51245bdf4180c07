//! Process lifecycle: shutdown propagation.
//!
//! A broadcast channel fans the shutdown signal out to every long-running
//! task; each task `select!`s on its receiver and exits promptly.

use tokio::sync::broadcast;
use tracing::info;

/// Owns the shutdown broadcast channel.
pub struct Lifecycle {
    shutdown_tx: broadcast::Sender<()>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx }
    }

    /// Subscribe a task to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast shutdown to every subscribed task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Spawn the signal handler: the first SIGINT or SIGTERM broadcasts
    /// shutdown.
    pub fn spawn_signal_handler(&self) {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = sigint.recv() => info!("Received SIGINT - initiating graceful shutdown"),
                _ = sigterm.recv() => info!("Received SIGTERM - initiating graceful shutdown"),
            }

            let _ = shutdown_tx.send(());
        });
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
