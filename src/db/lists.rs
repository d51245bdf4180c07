//! Repository for the permanent blacklist and whitelist.
//!
//! Both tables share the same shape: `(id, ip_address UNIQUE, reason,
//! created_at, created_by, enabled)`. Removal is a soft-delete
//! (`enabled = FALSE`); membership tests only consult enabled rows.

use super::DbError;
use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::SqlitePool;

/// An entry of either persistent list.
#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: i64,
    pub ip_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub created_by: String,
    pub enabled: bool,
}

/// Which persistent list a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum List {
    Blacklist,
    Whitelist,
}

impl List {
    fn table(self) -> &'static str {
        match self {
            List::Blacklist => "blacklist",
            List::Whitelist => "whitelist",
        }
    }
}

/// Repository for persistent list operations.
pub struct ListRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ListRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    // ========== Blacklist operations ==========

    /// Add an address to the blacklist. A duplicate address surfaces as
    /// [`DbError::AlreadyListed`], not a fatal error.
    pub async fn add_to_blacklist(
        &self,
        address: &str,
        reason: &str,
        created_by: &str,
    ) -> Result<(), DbError> {
        self.insert(List::Blacklist, address, reason, created_by).await
    }

    /// Soft-delete an address from the blacklist. Returns whether a row
    /// changed.
    pub async fn remove_from_blacklist(&self, address: &str) -> Result<bool, DbError> {
        self.disable(List::Blacklist, address).await
    }

    /// Check whether an address appears enabled in the blacklist.
    pub async fn is_blacklisted(&self, address: &str) -> Result<bool, DbError> {
        self.contains(List::Blacklist, address).await
    }

    /// All enabled blacklist entries, newest first.
    pub async fn get_blacklist(&self) -> Result<Vec<ListEntry>, DbError> {
        self.entries(List::Blacklist).await
    }

    // ========== Whitelist operations ==========

    /// Add an address to the whitelist. A duplicate address surfaces as
    /// [`DbError::AlreadyListed`].
    pub async fn add_to_whitelist(
        &self,
        address: &str,
        reason: &str,
        created_by: &str,
    ) -> Result<(), DbError> {
        self.insert(List::Whitelist, address, reason, created_by).await
    }

    /// Soft-delete an address from the whitelist. Returns whether a row
    /// changed.
    pub async fn remove_from_whitelist(&self, address: &str) -> Result<bool, DbError> {
        self.disable(List::Whitelist, address).await
    }

    /// Check whether an address appears enabled in the whitelist.
    pub async fn is_whitelisted(&self, address: &str) -> Result<bool, DbError> {
        self.contains(List::Whitelist, address).await
    }

    /// All enabled whitelist entries, newest first.
    pub async fn get_whitelist(&self) -> Result<Vec<ListEntry>, DbError> {
        self.entries(List::Whitelist).await
    }

    // ========== Shared plumbing ==========

    async fn insert(
        &self,
        list: List,
        address: &str,
        reason: &str,
        created_by: &str,
    ) -> Result<(), DbError> {
        let sql = format!(
            "INSERT INTO {} (ip_address, reason, created_by) VALUES (?, ?, ?)",
            list.table()
        );
        sqlx::query(&sql)
            .bind(address)
            .bind(reason)
            .bind(created_by)
            .execute(self.pool)
            .await
            .map_err(|e| DbError::from_insert(e, address))?;
        Ok(())
    }

    async fn disable(&self, list: List, address: &str) -> Result<bool, DbError> {
        let sql = format!(
            "UPDATE {} SET enabled = FALSE WHERE ip_address = ? AND enabled = TRUE",
            list.table()
        );
        let result = sqlx::query(&sql).bind(address).execute(self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn contains(&self, list: List, address: &str) -> Result<bool, DbError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE ip_address = ? AND enabled = TRUE",
            list.table()
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(address)
            .fetch_one(self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn entries(&self, list: List) -> Result<Vec<ListEntry>, DbError> {
        let sql = format!(
            r#"
            SELECT id, ip_address, reason, created_at, created_by, enabled
            FROM {}
            WHERE enabled = TRUE
            ORDER BY created_at DESC
            "#,
            list.table()
        );
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, NaiveDateTime, String, bool)>(
            &sql,
        )
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, ip_address, reason, created_at, created_by, enabled)| ListEntry {
                    id,
                    ip_address,
                    reason,
                    created_at,
                    created_by,
                    enabled,
                },
            )
            .collect())
    }
}
