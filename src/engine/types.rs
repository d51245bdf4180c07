//! Ledger record types.

use chrono::{DateTime, Utc};

/// A single recorded violation.
#[derive(Debug, Clone)]
pub struct Violation {
    pub timestamp: DateTime<Utc>,
    pub severity: i32,
    pub description: String,
}

/// Per-address ledger entry.
///
/// `violations` only holds entries inside the configured time window; the
/// window is re-trimmed on every new violation. `ban_expiry = None` means
/// never banned or ban cleared. `ban_count` is monotonic for the lifetime
/// of the entry and only disappears with TTL eviction.
#[derive(Debug, Clone)]
pub struct AddrEntry {
    pub violations: Vec<Violation>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_severity: i32,
    pub ban_count: u32,
    pub ban_expiry: Option<DateTime<Utc>>,
}

impl AddrEntry {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            violations: Vec::new(),
            first_seen: now,
            last_seen: now,
            total_severity: 0,
            ban_count: 0,
            ban_expiry: None,
        }
    }

    /// Whether the entry carries a ban that is still in force at `now`.
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.ban_expiry.is_some_and(|expiry| expiry > now)
    }

    /// Drop violations outside the window ending at `now` and recompute the
    /// severity sum.
    pub fn trim_window(&mut self, now: DateTime<Utc>, window: chrono::Duration) {
        let cutoff = now - window;
        self.violations.retain(|v| v.timestamp > cutoff);
        self.total_severity = self.violations.iter().map(|v| v.severity).sum();
    }
}

/// Snapshot of prefix index and ledger statistics.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RadixStats {
    pub total_ips_tracked: usize,
    pub currently_banned: usize,
    pub tree_nodes: usize,
}
