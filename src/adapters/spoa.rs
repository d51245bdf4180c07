//! HAProxy SPOA adapter.
//!
//! Line-oriented TCP dialect: HAProxy (via an SPOE `agent-string` setup)
//! sends `haproxy_processing src=<addr> [tokens...]` and receives
//! `banned=0` or `banned=1`. `notify` messages are consumed silently;
//! unknown commands and blank lines get no reply.
//!
//! This is the simplified line dialect, deliberately retained; it is not
//! the binary SPOP framing and the two are not interchangeable.

use crate::adapters::Decider;
use crate::config::SpoaConfig;
use crate::metrics;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, info, warn};

/// Upper bound on one request line; longer lines fail the codec and close
/// the connection.
const MAX_LINE_LENGTH: usize = 4096;

/// SPOA TCP server.
pub struct SpoaServer {
    config: SpoaConfig,
    decider: Decider,
}

impl SpoaServer {
    pub fn new(config: SpoaConfig, decider: Decider) -> Self {
        Self { config, decider }
    }

    /// Bind and serve until shutdown. Client connections are capped at
    /// `max_clients`; each runs on its own task.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.address).await?;
        info!(address = %self.config.address, "SPOA server started");

        let clients = Arc::new(Semaphore::new(self.config.max_clients));
        let read_timeout = self.config.read_timeout();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let Ok(permit) = Arc::clone(&clients).acquire_owned().await else {
                                // Semaphore closed only at teardown.
                                break;
                            };
                            debug!(%peer, "SPOA client connected");

                            let decider = Arc::clone(&self.decider);
                            let client_shutdown = shutdown.resubscribe();
                            tokio::spawn(async move {
                                if let Err(e) =
                                    handle_client(stream, decider, read_timeout, client_shutdown).await
                                {
                                    warn!(%peer, error = %e, "SPOA client error");
                                }
                                debug!(%peer, "SPOA client disconnected");
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept SPOA connection");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("SPOA server stopping");
                    return Ok(());
                }
            }
        }

        Ok(())
    }
}

/// Per-connection loop: read lines until timeout, EOF, or shutdown.
async fn handle_client(
    stream: TcpStream,
    decider: Decider,
    read_timeout: std::time::Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), tokio_util::codec::LinesCodecError> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    loop {
        let next = tokio::select! {
            next = timeout(read_timeout, framed.next()) => next,
            _ = shutdown.recv() => return Ok(()),
        };

        let line = match next {
            // Read deadline expired: close the connection.
            Err(_elapsed) => return Ok(()),
            Ok(None) => return Ok(()),
            Ok(Some(line)) => line?,
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(response) = process_message(&decider, line).await {
            framed.send(response).await?;
        }
    }
}

/// Dispatch one request line. Returns the reply line, if any.
async fn process_message(decider: &Decider, line: &str) -> Option<String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }

    match parts[0] {
        "haproxy_processing" => Some(handle_processing(decider, &parts[1..]).await),
        "notify" => None,
        _ => None,
    }
}

/// Answer a `haproxy_processing` request: the first `src=<addr>` token is
/// the subject; without one the reply is `banned=0`.
async fn handle_processing(decider: &Decider, parts: &[&str]) -> String {
    for part in parts {
        if let Some(ip) = part.strip_prefix("src=") {
            let banned = decider.is_banned(ip).await;
            metrics::record_decision("spoa", banned);
            if banned {
                debug!(ip = %ip, "Blocking banned IP via SPOA");
                return "banned=1".to_string();
            }
            return "banned=0".to_string();
        }
    }
    "banned=0".to_string()
}
