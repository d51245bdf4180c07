//! The three authorization protocols must yield the same decision for the
//! same address at the same instant.

mod common;

use common::{test_policy, SpoaClient, TestStack};
use fail2ban_gate::adapters::envoy::proto::attribute_context::{
    HttpRequest, Request as AttrRequest,
};
use fail2ban_gate::adapters::envoy::proto::authorization_client::AuthorizationClient;
use fail2ban_gate::adapters::envoy::proto::{AttributeContext, CheckRequest};
use fail2ban_gate::db::Database;
use std::collections::HashMap;
use std::time::Duration;

fn check_request_with_real_ip(ip: &str) -> CheckRequest {
    let mut headers = HashMap::new();
    headers.insert("x-real-ip".to_string(), ip.to_string());
    CheckRequest {
        attributes: Some(AttributeContext {
            source: None,
            destination: None,
            request: Some(AttrRequest {
                http: Some(HttpRequest {
                    headers,
                    path: "/login".to_string(),
                    host: "mail.example.test".to_string(),
                }),
            }),
        }),
    }
}

async fn grpc_check(addr: std::net::SocketAddr, ip: &str) -> i32 {
    let mut client = AuthorizationClient::connect(format!("http://{addr}"))
        .await
        .expect("connect ext_authz");
    let response = client
        .check(check_request_with_real_ip(ip))
        .await
        .expect("check call")
        .into_inner();
    response.status.expect("status set").code
}

/// S2/P8: after a ban, SPOA answers banned=1, ext_authz answers
/// PERMISSION_DENIED, and auth_request answers 403 - and all three allow an
/// unknown address.
#[tokio::test]
async fn all_adapters_agree_on_decisions() {
    let stack = TestStack::spawn(test_policy(), None).await;
    let banned_ip = "192.168.1.200";

    for _ in 0..3 {
        stack.engine.record_violation(banned_ip, 3, "auth failure");
    }
    assert!(stack.engine.is_banned(banned_ip).await);

    // SPOA: banned=1
    let mut spoa = SpoaClient::connect(stack.spoa_addr).await;
    spoa.send_line(&format!("haproxy_processing src={banned_ip}"))
        .await;
    assert_eq!(spoa.read_line().await, "banned=1");

    // ext_authz: PERMISSION_DENIED
    let code = grpc_check(stack.envoy_addr, banned_ip).await;
    assert_eq!(code, tonic::Code::PermissionDenied as i32);

    // auth_request: 403 with decision headers
    let client = reqwest::Client::new();
    let response = client
        .get(stack.nginx_url("/auth"))
        .header("X-Real-IP", banned_ip)
        .send()
        .await
        .expect("auth request");
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers().get("X-Fail2ban-Status").unwrap(),
        "denied"
    );
    assert_eq!(response.headers().get("X-Fail2ban-IP").unwrap(), banned_ip);
    assert_eq!(
        response.headers().get("X-Fail2ban-Service").unwrap(),
        "fail2ban-nginx-auth"
    );
    let body: serde_json::Value = response.json().await.expect("json body");
    assert_eq!(body["error"], "access_denied");
    assert_eq!(body["ip"], banned_ip);

    // The same trio allows an address nobody has seen.
    let clean_ip = "10.0.0.99";

    spoa.send_line(&format!("haproxy_processing src={clean_ip}"))
        .await;
    assert_eq!(spoa.read_line().await, "banned=0");

    assert_eq!(
        grpc_check(stack.envoy_addr, clean_ip).await,
        tonic::Code::Ok as i32
    );

    let response = client
        .get(stack.nginx_url("/auth"))
        .header("X-Real-IP", clean_ip)
        .send()
        .await
        .expect("auth request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Fail2ban-Status").unwrap(),
        "allowed"
    );
    assert_eq!(response.headers().get("X-Fail2ban-IP").unwrap(), clean_ip);
}

/// S3: the whitelist overrides the ledger on every protocol.
#[tokio::test]
async fn whitelisted_address_is_allowed_everywhere() {
    let db = Database::new(":memory:").await.expect("database");
    db.lists()
        .add_to_whitelist("10.0.20.1", "trusted", "tests")
        .await
        .expect("insert");

    let stack = TestStack::spawn(test_policy(), Some(db)).await;
    for _ in 0..5 {
        stack.engine.record_violation("10.0.20.1", 6, "burst");
    }

    let mut spoa = SpoaClient::connect(stack.spoa_addr).await;
    spoa.send_line("haproxy_processing src=10.0.20.1").await;
    assert_eq!(spoa.read_line().await, "banned=0");

    assert_eq!(
        grpc_check(stack.envoy_addr, "10.0.20.1").await,
        tonic::Code::Ok as i32
    );

    let response = reqwest::Client::new()
        .get(stack.nginx_url("/auth"))
        .header("X-Real-IP", "10.0.20.1")
        .send()
        .await
        .expect("auth request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}

/// S6: the SPOA line dialect - reply for queries, silence for notify,
/// blank lines, and unknown commands.
#[tokio::test]
async fn spoa_line_dialect() {
    let stack = TestStack::spawn(test_policy(), None).await;
    let mut spoa = SpoaClient::connect(stack.spoa_addr).await;

    spoa.send_line("haproxy_processing src=10.0.0.99").await;
    assert_eq!(spoa.read_line().await, "banned=0");

    spoa.send_line("notify event=x").await;
    spoa.expect_silence(Duration::from_millis(300)).await;

    spoa.send_line("").await;
    spoa.expect_silence(Duration::from_millis(300)).await;

    spoa.send_line("totally unknown command").await;
    spoa.expect_silence(Duration::from_millis(300)).await;

    // The connection is still alive and answering.
    spoa.send_line("haproxy_processing src=10.0.0.99").await;
    assert_eq!(spoa.read_line().await, "banned=0");
}

/// A query with no src token is answered banned=0.
#[tokio::test]
async fn spoa_missing_src_allows() {
    let stack = TestStack::spawn(test_policy(), None).await;
    let mut spoa = SpoaClient::connect(stack.spoa_addr).await;

    spoa.send_line("haproxy_processing sid=42").await;
    assert_eq!(spoa.read_line().await, "banned=0");
}

/// ext_authz with no extractable address allows (fail-open).
#[tokio::test]
async fn envoy_without_address_allows() {
    let stack = TestStack::spawn(test_policy(), None).await;

    let mut client = AuthorizationClient::connect(format!("http://{}", stack.envoy_addr))
        .await
        .expect("connect");
    let response = client
        .check(CheckRequest { attributes: None })
        .await
        .expect("check")
        .into_inner();
    assert_eq!(response.status.expect("status").code, tonic::Code::Ok as i32);
}

/// The nginx health endpoint reports the service identity.
#[tokio::test]
async fn nginx_health_endpoint() {
    let stack = TestStack::spawn(test_policy(), None).await;

    let body: serde_json::Value = reqwest::Client::new()
        .get(stack.nginx_url("/health"))
        .send()
        .await
        .expect("health request")
        .json()
        .await
        .expect("json");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "fail2ban-nginx-auth");
}

/// X-Forwarded-For wins over the transport address and uses its first
/// element.
#[tokio::test]
async fn nginx_uses_first_forwarded_address() {
    let stack = TestStack::spawn(test_policy(), None).await;
    stack
        .engine
        .manual_ban("203.0.113.77", chrono::Duration::seconds(300))
        .expect("manual ban");

    let response = reqwest::Client::new()
        .get(stack.nginx_url("/auth"))
        .header("X-Forwarded-For", "203.0.113.77, 198.51.100.1")
        .send()
        .await
        .expect("auth request");
    assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers().get("X-Fail2ban-IP").unwrap(),
        "203.0.113.77"
    );
}
