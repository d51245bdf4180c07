//! Syslog ingestion over UDP.
//!
//! One datagram is one log line; lines longer than the 4 KiB receive buffer
//! are truncated by the transport, which also bounds regex evaluation cost.
//! Lines matching no pattern are ignored.

pub mod matcher;

pub use matcher::{LineMatch, PatternSet};

use crate::engine::BanEngine;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Maximum datagram size accepted; one UDP datagram carries one log line.
const MAX_DATAGRAM: usize = 4096;

/// UDP log reader feeding the pattern matcher and the ban engine.
pub struct SyslogReader {
    address: SocketAddr,
    patterns: Arc<RwLock<Arc<PatternSet>>>,
    engine: Arc<BanEngine>,
}

impl SyslogReader {
    /// Create a reader. `patterns` is shared with the config manager so a
    /// dynamic reload swaps the active rule set without restarting the
    /// socket loop.
    pub fn new(
        address: SocketAddr,
        patterns: Arc<RwLock<Arc<PatternSet>>>,
        engine: Arc<BanEngine>,
    ) -> Self {
        Self {
            address,
            patterns,
            engine,
        }
    }

    /// Bind the socket and process datagrams until shutdown. The receive
    /// loop observes cancellation between datagrams; the one currently
    /// being decoded is always completed.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> std::io::Result<()> {
        let socket = UdpSocket::bind(self.address).await?;
        info!(address = %self.address, "Syslog reader started");

        let mut buffer = [0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                result = socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _peer)) => {
                            let line = String::from_utf8_lossy(&buffer[..len]);
                            self.process_line(line.trim());
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read from syslog socket");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Syslog reader stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Run one line through the matcher and record every extracted
    /// violation.
    fn process_line(&self, line: &str) {
        if line.is_empty() {
            return;
        }

        let patterns = Arc::clone(&self.patterns.read());
        for found in patterns.scan(line) {
            self.engine
                .record_violation(&found.ip, found.severity, &found.description);
        }
    }
}
