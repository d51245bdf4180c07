//! Ban engine: violation ledger, ban state machine, and decision checks.
//!
//! The ledger (per-address history) and the prefix index (banned-address
//! trie) form one shared structure behind a single readers-writer lock.
//! Engine operations are synchronous and run to completion under the lock;
//! database lookups for the persistent lists happen before the lock is
//! taken, never while holding it.

mod trie;
mod types;

pub use trie::PrefixIndex;
pub use types::{AddrEntry, RadixStats, Violation};

use crate::config::BanConfig;
use crate::db::Database;
use crate::metrics;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),
    #[error(transparent)]
    Db(#[from] crate::db::DbError),
}

/// Outcome of a manual unban, reported back through the admin API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnbanOutcome {
    /// A temporary ban was cleared from the ledger/index.
    pub cleared_temporary: bool,
    /// The address was also removed from the persistent blacklist.
    pub removed_from_blacklist: bool,
}

/// Ledger map plus prefix index, mutated together under one lock.
#[derive(Debug, Default)]
struct EngineState {
    entries: HashMap<String, AddrEntry>,
    index: PrefixIndex,
}

/// Decision of the read-locked phase of `is_banned`.
enum LedgerVerdict {
    Banned,
    NotBanned,
    /// Ban expired; the index terminal still needs clearing.
    ExpiredNeedsCleanup,
}

/// The ban decision engine shared by the ingestor, the adapters, and the
/// admin API.
pub struct BanEngine {
    state: RwLock<EngineState>,
    policy: RwLock<BanConfig>,
    /// Persistent list storage; `None` runs the engine memory-only.
    database: Option<Database>,
}

impl BanEngine {
    pub fn new(policy: BanConfig, database: Option<Database>) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(EngineState::default()),
            policy: RwLock::new(policy),
            database,
        })
    }

    /// Current ban policy (cheap clone).
    pub fn policy(&self) -> BanConfig {
        self.policy.read().clone()
    }

    /// Replace the ban policy; used by the dynamic config reloader.
    pub fn update_policy(&self, policy: BanConfig) {
        *self.policy.write() = policy;
    }

    /// Canonicalize a textual address. Rejects everything that is not a
    /// valid v4/v6 form.
    fn canonical(addr: &str) -> Option<String> {
        addr.trim().parse::<IpAddr>().ok().map(|ip| ip.to_string())
    }

    // ========================================================================
    // Violation path
    // ========================================================================

    /// Record one violation against an address. Malformed addresses are
    /// dropped without touching engine state.
    pub fn record_violation(&self, addr: &str, severity: i32, description: &str) {
        self.record_violation_at(addr, severity, description, Utc::now());
    }

    fn record_violation_at(
        &self,
        addr: &str,
        severity: i32,
        description: &str,
        now: DateTime<Utc>,
    ) {
        let Some(ip) = Self::canonical(addr) else {
            debug!(addr = %addr, "Dropping violation for malformed address");
            return;
        };

        let policy = self.policy();
        let mut state = self.state.write();

        let entry = state
            .entries
            .entry(ip.clone())
            .or_insert_with(|| AddrEntry::new(now));

        entry.last_seen = now;
        entry.violations.push(Violation {
            timestamp: now,
            severity,
            description: description.to_string(),
        });
        entry.trim_window(now, policy.time_window());

        if entry.violations.len() >= policy.max_attempts as usize && !entry.is_banned_at(now) {
            Self::apply_ban(&mut state, &ip, &policy, now);
        }
    }

    /// Apply an escalating ban to an address whose in-window violation count
    /// crossed the threshold.
    ///
    /// Escalation curve: `initial_ban_time × ban_count × escalation_factor`,
    /// capped at `max_ban_time`. The growth is linear in the ban count (the
    /// second ban lasts initial × 2 × factor), not exponential.
    fn apply_ban(state: &mut EngineState, ip: &str, policy: &BanConfig, now: DateTime<Utc>) {
        let entry = match state.entries.get_mut(ip) {
            Some(entry) => entry,
            None => return,
        };

        entry.ban_count += 1;

        let scaled =
            policy.initial_ban_time_seconds as f64 * entry.ban_count as f64 * policy.escalation_factor;
        let capped = scaled.min(policy.max_ban_time_seconds as f64);
        let duration = chrono::Duration::milliseconds((capped * 1000.0) as i64);

        entry.ban_expiry = Some(now + duration);
        let violations = entry.violations.len();
        let ban_count = entry.ban_count;
        let expires = entry.ban_expiry;

        state.index.insert(ip);

        metrics::BANS_TOTAL.inc();
        metrics::BAN_DURATION_SECONDS.observe(capped);

        info!(
            ip = %ip,
            duration_seconds = capped as i64,
            ban_count = ban_count,
            violations = violations,
            expires = ?expires,
            "IP banned"
        );
    }

    // ========================================================================
    // Decision path
    // ========================================================================

    /// Answer whether an address is banned right now.
    ///
    /// Ordered checks: whitelist overrides everything, then the blacklist
    /// forces a deny, then the ledger and prefix index decide. A stale index
    /// terminal left behind by an expired ban is cleared on the way out.
    pub async fn is_banned(&self, addr: &str) -> bool {
        let Some(ip) = Self::canonical(addr) else {
            return false;
        };

        if let Some(db) = &self.database {
            let lists = db.lists();
            match lists.is_whitelisted(&ip).await {
                Ok(true) => return false,
                Ok(false) => {}
                Err(e) => warn!(ip = %ip, error = %e, "Whitelist check failed"),
            }
            match lists.is_blacklisted(&ip).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => warn!(ip = %ip, error = %e, "Blacklist check failed"),
            }
        }

        self.is_banned_in_ledger(&ip)
    }

    /// Ledger + index check with self-healing of expired terminals.
    fn is_banned_in_ledger(&self, ip: &str) -> bool {
        let now = Utc::now();

        let verdict = {
            let state = self.state.read();
            match state.entries.get(ip) {
                None => LedgerVerdict::NotBanned,
                Some(entry) if entry.is_banned_at(now) => {
                    if state.index.search(ip) {
                        LedgerVerdict::Banned
                    } else {
                        // Index lost the terminal while the ledger still
                        // holds a live ban; nothing to clear, deny is not
                        // justified by the index.
                        LedgerVerdict::NotBanned
                    }
                }
                Some(entry) if entry.ban_expiry.is_some() => LedgerVerdict::ExpiredNeedsCleanup,
                Some(_) => LedgerVerdict::NotBanned,
            }
        };

        match verdict {
            LedgerVerdict::Banned => true,
            LedgerVerdict::NotBanned => false,
            LedgerVerdict::ExpiredNeedsCleanup => {
                // Promote to exclusive access and re-verify before healing.
                let mut state = self.state.write();
                let still_expired = state
                    .entries
                    .get(ip)
                    .is_some_and(|e| e.ban_expiry.is_some() && !e.is_banned_at(Utc::now()));
                if still_expired {
                    state.index.delete(ip);
                }
                false
            }
        }
    }

    // ========================================================================
    // Manual operations
    // ========================================================================

    /// Ban an address for a fixed duration, bypassing the violation
    /// threshold. Creates the ledger entry if missing.
    pub fn manual_ban(&self, addr: &str, duration: chrono::Duration) -> Result<(), EngineError> {
        let ip = Self::canonical(addr).ok_or_else(|| EngineError::InvalidAddress(addr.to_string()))?;

        let now = Utc::now();
        let mut state = self.state.write();

        let entry = state
            .entries
            .entry(ip.clone())
            .or_insert_with(|| AddrEntry::new(now));
        entry.ban_expiry = Some(now + duration);
        entry.ban_count += 1;
        entry.last_seen = now;
        let expires = entry.ban_expiry;

        state.index.insert(&ip);

        info!(ip = %ip, duration_seconds = duration.num_seconds(), expires = ?expires, "Manual ban applied");
        Ok(())
    }

    /// Clear any temporary ban for an address and drop it from the
    /// persistent blacklist if it is enabled there.
    pub async fn manual_unban(&self, addr: &str) -> Result<UnbanOutcome, EngineError> {
        let ip = Self::canonical(addr).ok_or_else(|| EngineError::InvalidAddress(addr.to_string()))?;

        let cleared_temporary = {
            let mut state = self.state.write();
            state.index.delete(&ip);
            match state.entries.get_mut(&ip) {
                Some(entry) => {
                    let had_ban = entry.ban_expiry.is_some();
                    entry.ban_expiry = None;
                    had_ban
                }
                None => false,
            }
        };

        let mut removed_from_blacklist = false;
        if let Some(db) = &self.database {
            removed_from_blacklist = db.lists().remove_from_blacklist(&ip).await?;
        }

        info!(
            ip = %ip,
            cleared_temporary = cleared_temporary,
            removed_from_blacklist = removed_from_blacklist,
            "Manual unban applied"
        );

        Ok(UnbanOutcome {
            cleared_temporary,
            removed_from_blacklist,
        })
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Clear every temporary ban, expired or not. Returns the count purged.
    pub fn purge_all_temporary_bans(&self) -> usize {
        let mut state = self.state.write();
        let mut purged: Vec<String> = Vec::new();

        for (ip, entry) in state.entries.iter_mut() {
            if entry.ban_expiry.is_some() {
                entry.ban_expiry = None;
                purged.push(ip.clone());
            }
        }
        for ip in &purged {
            state.index.delete(ip);
        }

        info!(count = purged.len(), "Purged all temporary bans");
        purged.len()
    }

    /// Clear bans whose expiry has passed. Returns the count purged.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut state = self.state.write();
        let mut purged: Vec<String> = Vec::new();

        for (ip, entry) in state.entries.iter_mut() {
            if entry.ban_expiry.is_some_and(|expiry| expiry < now) {
                entry.ban_expiry = None;
                purged.push(ip.clone());
            }
        }
        for ip in &purged {
            state.index.delete(ip);
        }

        if !purged.is_empty() {
            info!(count = purged.len(), "Purged expired bans");
        }
        purged.len()
    }

    /// Evict entries untouched for longer than `max_memory_ttl` that are not
    /// currently banned. Returns the count evicted.
    pub fn sweep_memory(&self) -> usize {
        let now = Utc::now();
        let cutoff = now - self.policy().max_memory_ttl();
        let mut state = self.state.write();

        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.last_seen < cutoff && !entry.is_banned_at(now))
            .map(|(ip, _)| ip.clone())
            .collect();

        for ip in &stale {
            state.entries.remove(ip);
            state.index.delete(ip);
            debug!(ip = %ip, "Evicted idle ledger entry");
        }
        stale.len()
    }

    /// Snapshot of every address with a ban still in force.
    pub fn list_currently_banned(&self) -> Vec<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let state = self.state.read();
        state
            .entries
            .iter()
            .filter_map(|(ip, entry)| {
                entry
                    .ban_expiry
                    .filter(|expiry| *expiry > now)
                    .map(|expiry| (ip.clone(), expiry))
            })
            .collect()
    }

    /// Ledger and prefix index statistics.
    pub fn radix_stats(&self) -> RadixStats {
        let now = Utc::now();
        let state = self.state.read();
        let currently_banned = state
            .entries
            .values()
            .filter(|entry| entry.is_banned_at(now))
            .count();
        RadixStats {
            total_ips_tracked: state.entries.len(),
            currently_banned,
            tree_nodes: state.index.node_count(),
        }
    }

    /// Snapshot of one ledger entry (diagnostics and tests).
    pub fn entry(&self, addr: &str) -> Option<AddrEntry> {
        let ip = Self::canonical(addr)?;
        self.state.read().entries.get(&ip).cloned()
    }

    /// Run the periodic cleanup until shutdown: purge expired bans, then
    /// evict idle entries.
    pub async fn run_cleanup(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let interval = self.policy().cleanup_interval();
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.purge_expired();
                    self.sweep_memory();
                    metrics::CURRENTLY_BANNED.set(self.radix_stats().currently_banned as i64);
                }
                _ = shutdown.recv() => {
                    info!("Cleanup task stopping");
                    break;
                }
            }
        }
    }

    #[cfg(test)]
    fn set_ban_expiry(&self, addr: &str, expiry: Option<DateTime<Utc>>) {
        let ip = Self::canonical(addr).expect("test address");
        let mut state = self.state.write();
        if let Some(entry) = state.entries.get_mut(&ip) {
            entry.ban_expiry = expiry;
        }
    }

    #[cfg(test)]
    fn set_last_seen(&self, addr: &str, when: DateTime<Utc>) {
        let ip = Self::canonical(addr).expect("test address");
        let mut state = self.state.write();
        if let Some(entry) = state.entries.get_mut(&ip) {
            entry.last_seen = when;
        }
    }
}
