//! End-to-end ban lifecycle: syslog burst to ban, escalation, sweep.

mod common;

use common::{eventually, test_policy, TestStack};
use fail2ban_gate::config::BanConfig;
use fail2ban_gate::db::Database;
use fail2ban_gate::engine::BanEngine;
use std::time::Duration;

/// Three matching log lines inside the window ban the source address, with
/// the first ban lasting initial × 1 × factor and capped by max_ban_time.
#[tokio::test]
async fn auth_failure_burst_bans_source() {
    let stack = TestStack::spawn(test_policy(), None).await;

    for _ in 0..3 {
        stack
            .send_log_line("Oct 15 10:30:15 mail dovecot: auth failed, rip=192.168.1.200")
            .await;
    }

    let banned = eventually(Duration::from_secs(5), || {
        let engine = stack.engine.clone();
        async move { engine.is_banned("192.168.1.200").await }
    })
    .await;
    assert!(banned, "address should be banned after the burst");

    let entry = stack.engine.entry("192.168.1.200").expect("ledger entry");
    assert_eq!(entry.ban_count, 1);

    // 300s × 1 × 2.0 = 600s ≈ 10 minutes, well under the 24h cap.
    let remaining = entry.ban_expiry.expect("banned") - chrono::Utc::now();
    assert!(remaining > chrono::Duration::seconds(590));
    assert!(remaining <= chrono::Duration::seconds(600));
}

/// Lines that match no pattern change nothing.
#[tokio::test]
async fn unmatched_lines_are_ignored() {
    let stack = TestStack::spawn(test_policy(), None).await;

    stack
        .send_log_line("Oct 15 10:30:15 mail postsomething: all quiet")
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(stack.engine.radix_stats().total_ips_tracked, 0);
}

/// After the first ban lapses, a fresh threshold crossing escalates: the
/// second ban is strictly longer (initial × 2 × factor) than the first.
#[tokio::test]
async fn second_ban_escalates() {
    let policy = BanConfig {
        initial_ban_time_seconds: 1,
        max_ban_time_seconds: 3600,
        escalation_factor: 2.0,
        max_attempts: 3,
        time_window_seconds: 600,
        cleanup_interval_seconds: 60,
        max_memory_ttl_seconds: 259_200,
    };
    let engine = BanEngine::new(policy, None);
    let ip = "198.51.100.9";

    for _ in 0..3 {
        engine.record_violation(ip, 1, "auth failure");
    }
    let first = stack_ban_length(&engine, ip);
    assert_eq!(engine.entry(ip).unwrap().ban_count, 1);
    assert!(engine.is_banned(ip).await);

    // Wait out the first ban (1s × 1 × 2.0 = 2s).
    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert!(!engine.is_banned(ip).await);

    for _ in 0..3 {
        engine.record_violation(ip, 1, "auth failure");
    }
    let entry = engine.entry(ip).expect("entry");
    assert_eq!(entry.ban_count, 2);
    let second = stack_ban_length(&engine, ip);
    assert!(
        second > first,
        "second ban ({second:?}) should outlast the first ({first:?})"
    );
    assert!(engine.is_banned(ip).await);
}

fn stack_ban_length(engine: &BanEngine, ip: &str) -> chrono::Duration {
    engine.entry(ip).expect("entry").ban_expiry.expect("banned") - chrono::Utc::now()
}

/// An entry idle past max_memory_ttl (and not banned) disappears from the
/// ledger; tracked-address count drops.
#[tokio::test]
async fn idle_entries_are_swept() {
    let policy = BanConfig {
        max_memory_ttl_seconds: 1,
        ..test_policy()
    };
    let engine = BanEngine::new(policy, None);

    engine.record_violation("172.16.5.5", 1, "one-off");
    assert_eq!(engine.radix_stats().total_ips_tracked, 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    engine.sweep_memory();

    assert_eq!(engine.radix_stats().total_ips_tracked, 0);
    assert!(engine.entry("172.16.5.5").is_none());
}

/// The periodic cleanup task clears expired bans without intervention.
#[tokio::test]
async fn cleanup_task_purges_expired_bans() {
    let policy = BanConfig {
        initial_ban_time_seconds: 1,
        escalation_factor: 1.5,
        cleanup_interval_seconds: 1,
        ..test_policy()
    };
    let stack = TestStack::spawn(policy, None).await;
    let engine = stack.engine.clone();

    tokio::spawn(engine.clone().run_cleanup(stack.lifecycle.subscribe()));

    for _ in 0..3 {
        engine.record_violation("198.51.100.77", 1, "auth failure");
    }
    assert!(engine.is_banned("198.51.100.77").await);

    // Ban lasts 1.5s; the cleanup tick should zero the expiry afterwards.
    let cleared = eventually(Duration::from_secs(5), || {
        let engine = engine.clone();
        async move {
            engine
                .entry("198.51.100.77")
                .is_some_and(|e| e.ban_expiry.is_none())
        }
    })
    .await;
    assert!(cleared, "cleanup should clear the lapsed ban");
}

/// Whitelisted addresses never get reported banned, violation bursts or not.
#[tokio::test]
async fn whitelist_precedence_over_bursts() {
    let db = Database::new(":memory:").await.expect("database");
    db.lists()
        .add_to_whitelist("10.0.0.1", "trusted network", "tests")
        .await
        .expect("whitelist insert");

    let stack = TestStack::spawn(test_policy(), Some(db)).await;

    for _ in 0..5 {
        stack
            .send_log_line("mail dovecot: auth failed, rip=10.0.0.1")
            .await;
    }

    // Wait until the violations landed, then confirm the decision.
    eventually(Duration::from_secs(5), || {
        let engine = stack.engine.clone();
        async move { engine.entry("10.0.0.1").is_some() }
    })
    .await;

    assert!(!stack.engine.is_banned("10.0.0.1").await);
}
