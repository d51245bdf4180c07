//! Shared helpers for integration tests: spawn the full stack on ephemeral
//! ports and drive it over real sockets.

#![allow(dead_code)] // Each test binary uses a different subset of helpers.

use fail2ban_gate::adapters::envoy::EnvoyServer;
use fail2ban_gate::adapters::nginx::NginxServer;
use fail2ban_gate::adapters::spoa::SpoaServer;
use fail2ban_gate::adapters::Decider;
use fail2ban_gate::config::{BanConfig, EnvoyConfig, NginxConfig, PatternRule, SpoaConfig};
use fail2ban_gate::db::Database;
use fail2ban_gate::engine::BanEngine;
use fail2ban_gate::ingest::{PatternSet, SyslogReader};
use fail2ban_gate::lifecycle::Lifecycle;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

/// Reserve a free TCP port on localhost.
pub fn free_tcp_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let port = listener.local_addr().expect("failed to get addr").port();
    drop(listener);
    port
}

/// Reserve a free UDP port on localhost.
pub fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("failed to bind");
    let port = socket.local_addr().expect("failed to get addr").port();
    drop(socket);
    port
}

/// A ban policy with short windows suitable for tests.
pub fn test_policy() -> BanConfig {
    BanConfig {
        initial_ban_time_seconds: 300,
        max_ban_time_seconds: 86_400,
        escalation_factor: 2.0,
        max_attempts: 3,
        time_window_seconds: 600,
        cleanup_interval_seconds: 60,
        max_memory_ttl_seconds: 259_200,
    }
}

/// The dovecot pattern used by the ingestion scenarios.
pub fn dovecot_pattern() -> PatternRule {
    PatternRule {
        name: "dovecot-auth-failure".to_string(),
        regex: r"dovecot.*auth failed.*rip=([0-9.]+)".to_string(),
        ip_group: 1,
        severity: 3,
        description: "Dovecot authentication failures".to_string(),
        enabled: true,
    }
}

/// The full stack bound to ephemeral localhost ports.
pub struct TestStack {
    pub engine: Arc<BanEngine>,
    pub lifecycle: Lifecycle,
    pub syslog_addr: SocketAddr,
    pub spoa_addr: SocketAddr,
    pub envoy_addr: SocketAddr,
    pub nginx_addr: SocketAddr,
}

impl TestStack {
    /// Spawn every listener with the given policy and optional database.
    pub async fn spawn(policy: BanConfig, database: Option<Database>) -> Self {
        let engine = BanEngine::new(policy, database.clone());
        let lifecycle = Lifecycle::new();

        let syslog_addr: SocketAddr = format!("127.0.0.1:{}", free_udp_port()).parse().unwrap();
        let spoa_addr: SocketAddr = format!("127.0.0.1:{}", free_tcp_port()).parse().unwrap();
        let envoy_addr: SocketAddr = format!("127.0.0.1:{}", free_tcp_port()).parse().unwrap();
        let nginx_addr: SocketAddr = format!("127.0.0.1:{}", free_tcp_port()).parse().unwrap();

        let patterns = Arc::new(RwLock::new(Arc::new(PatternSet::compile(&[
            dovecot_pattern(),
        ]))));

        let decider: Decider = engine.clone();

        let reader = SyslogReader::new(syslog_addr, Arc::clone(&patterns), Arc::clone(&engine));
        tokio::spawn(reader.run(lifecycle.subscribe()));

        let spoa = SpoaServer::new(
            SpoaConfig {
                enabled: true,
                address: spoa_addr,
                max_clients: 16,
                read_timeout_seconds: 5,
            },
            Arc::clone(&decider),
        );
        tokio::spawn(spoa.run(lifecycle.subscribe()));

        let envoy = EnvoyServer::new(
            EnvoyConfig {
                enabled: true,
                address: envoy_addr,
            },
            Arc::clone(&decider),
        );
        tokio::spawn(envoy.run(lifecycle.subscribe()));

        let nginx = NginxServer::new(
            NginxConfig {
                enabled: true,
                address: nginx_addr,
                read_timeout_seconds: 5,
                write_timeout_seconds: 5,
                return_json: true,
                enable_api: true,
            },
            Arc::clone(&decider),
            Arc::clone(&engine),
            database,
        );
        tokio::spawn(nginx.run(lifecycle.subscribe()));

        for addr in [spoa_addr, envoy_addr, nginx_addr] {
            wait_for_tcp(addr).await;
        }

        Self {
            engine,
            lifecycle,
            syslog_addr,
            spoa_addr,
            envoy_addr,
            nginx_addr,
        }
    }

    /// Send one syslog datagram.
    pub async fn send_log_line(&self, line: &str) {
        let socket = tokio::net::UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("bind sender");
        socket
            .send_to(line.as_bytes(), self.syslog_addr)
            .await
            .expect("send datagram");
    }

    pub fn nginx_url(&self, path: &str) -> String {
        format!("http://{}{}", self.nginx_addr, path)
    }
}

impl Drop for TestStack {
    fn drop(&mut self) {
        self.lifecycle.shutdown();
    }
}

/// Wait until a TCP listener accepts connections.
pub async fn wait_for_tcp(addr: SocketAddr) {
    for _ in 0..100 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("listener at {addr} did not come up");
}

/// Poll a condition until it holds or the deadline passes.
pub async fn eventually<F, Fut>(deadline: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if probe().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// A line-oriented SPOA test client.
pub struct SpoaClient {
    reader: BufReader<OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl SpoaClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect SPOA");
        let (read_half, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer,
        }
    }

    pub async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write line");
        self.writer.flush().await.expect("flush");
    }

    /// Read one reply line.
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).await.expect("read line");
        line.trim_end().to_string()
    }

    /// Assert no reply arrives within the wait window.
    pub async fn expect_silence(&mut self, wait: Duration) {
        let mut line = String::new();
        let read = tokio::time::timeout(wait, self.reader.read_line(&mut line)).await;
        assert!(
            read.is_err() || line.trim().is_empty(),
            "expected no reply, got: {line:?}"
        );
    }
}
