//! Repository for dynamic configuration rows.
//!
//! Detection patterns and the ban policy can live in the database so they
//! can be edited without restarting the daemon; the config manager reloads
//! them on an interval.

use super::DbError;
use crate::config::{BanConfig, PatternRule};
use sqlx::SqlitePool;
use tracing::warn;

/// A `ban_config` row, converted into the runtime [`BanConfig`] policy.
#[derive(Debug, Clone)]
pub struct BanConfigRow {
    pub initial_ban_time_seconds: i64,
    pub max_ban_time_seconds: i64,
    pub escalation_factor: f64,
    pub max_attempts: i64,
    pub time_window_seconds: i64,
    pub cleanup_interval_seconds: i64,
    pub max_memory_ttl_seconds: i64,
}

impl From<BanConfigRow> for BanConfig {
    fn from(row: BanConfigRow) -> Self {
        BanConfig {
            initial_ban_time_seconds: row.initial_ban_time_seconds.max(0) as u64,
            max_ban_time_seconds: row.max_ban_time_seconds.max(0) as u64,
            escalation_factor: row.escalation_factor,
            max_attempts: row.max_attempts.max(0) as u32,
            time_window_seconds: row.time_window_seconds.max(0) as u64,
            cleanup_interval_seconds: row.cleanup_interval_seconds.max(0) as u64,
            max_memory_ttl_seconds: row.max_memory_ttl_seconds.max(0) as u64,
        }
    }
}

/// Repository for pattern and ban policy rows.
pub struct DynamicsRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> DynamicsRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// All enabled detection patterns in stable (name) order.
    pub async fn get_patterns(&self) -> Result<Vec<PatternRule>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, i64, i64, Option<String>)>(
            r#"
            SELECT name, regex, ip_group, severity, description
            FROM patterns
            WHERE enabled = TRUE
            ORDER BY name
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, regex, ip_group, severity, description)| PatternRule {
                name,
                regex,
                ip_group: ip_group.max(0) as usize,
                severity: severity as i32,
                description: description.unwrap_or_default(),
                enabled: true,
            })
            .collect())
    }

    /// The newest enabled ban policy row, if any.
    pub async fn get_ban_config(&self) -> Result<Option<BanConfigRow>, DbError> {
        let row = sqlx::query_as::<_, (i64, i64, f64, i64, i64, i64, i64)>(
            r#"
            SELECT initial_ban_time_seconds, max_ban_time_seconds, escalation_factor,
                   max_attempts, time_window_seconds, cleanup_interval_seconds,
                   max_memory_ttl_seconds
            FROM ban_config
            WHERE enabled = TRUE
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(
            |(
                initial_ban_time_seconds,
                max_ban_time_seconds,
                escalation_factor,
                max_attempts,
                time_window_seconds,
                cleanup_interval_seconds,
                max_memory_ttl_seconds,
            )| BanConfigRow {
                initial_ban_time_seconds,
                max_ban_time_seconds,
                escalation_factor,
                max_attempts,
                time_window_seconds,
                cleanup_interval_seconds,
                max_memory_ttl_seconds,
            },
        ))
    }

    /// Seed default patterns and a default ban policy when the tables are
    /// empty, so a fresh database yields a working setup.
    pub async fn seed_defaults(&self) -> Result<(), DbError> {
        let pattern_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patterns")
            .fetch_one(self.pool)
            .await?;

        if pattern_count == 0 {
            let defaults: [(&str, &str, &str, i64, i64); 3] = [
                (
                    "dovecot-auth-failure",
                    r"auth failed.*rip=([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})",
                    "Dovecot authentication failures",
                    1,
                    3,
                ),
                (
                    "postfix-auth-failure",
                    r"authentication failed.*client=.*\[([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})\]",
                    "Postfix authentication failures",
                    1,
                    3,
                ),
                (
                    "sogo-auth-failure",
                    r"Login from '([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})' for user .* might not have worked",
                    "SOGo authentication failures",
                    1,
                    3,
                ),
            ];

            for (name, regex, description, ip_group, severity) in defaults {
                if let Err(e) = sqlx::query(
                    r#"
                    INSERT INTO patterns (name, regex, ip_group, severity, description)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(name)
                .bind(regex)
                .bind(ip_group)
                .bind(severity)
                .bind(description)
                .execute(self.pool)
                .await
                {
                    warn!(name = %name, error = %e, "Failed to insert default pattern");
                }
            }
        }

        let config_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ban_config")
            .fetch_one(self.pool)
            .await?;

        if config_count == 0 {
            let defaults = BanConfig::default();
            if let Err(e) = sqlx::query(
                r#"
                INSERT INTO ban_config (
                    name, initial_ban_time_seconds, max_ban_time_seconds, escalation_factor,
                    max_attempts, time_window_seconds, cleanup_interval_seconds,
                    max_memory_ttl_seconds
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind("default")
            .bind(defaults.initial_ban_time_seconds as i64)
            .bind(defaults.max_ban_time_seconds as i64)
            .bind(defaults.escalation_factor)
            .bind(defaults.max_attempts as i64)
            .bind(defaults.time_window_seconds as i64)
            .bind(defaults.cleanup_interval_seconds as i64)
            .bind(defaults.max_memory_ttl_seconds as i64)
            .execute(self.pool)
            .await
            {
                warn!(error = %e, "Failed to insert default ban config");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = Database::new(":memory:").await.expect("in-memory database");
        let dynamics = db.dynamics();

        dynamics.seed_defaults().await.unwrap();
        let first = dynamics.get_patterns().await.unwrap();
        assert!(!first.is_empty());

        dynamics.seed_defaults().await.unwrap();
        let second = dynamics.get_patterns().await.unwrap();
        assert_eq!(first.len(), second.len());

        let config = dynamics.get_ban_config().await.unwrap();
        assert!(config.is_some());
    }

    #[tokio::test]
    async fn ban_config_converts_to_policy() {
        let db = Database::new(":memory:").await.expect("in-memory database");
        let dynamics = db.dynamics();
        dynamics.seed_defaults().await.unwrap();

        let row = dynamics.get_ban_config().await.unwrap().expect("seeded row");
        let policy: crate::config::BanConfig = row.into();
        assert_eq!(policy.initial_ban_time_seconds, 300);
        assert!(policy.escalation_factor > 1.0);
    }
}
