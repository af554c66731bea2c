//! Postgres-backed implementation of the rule store.
//!
//! # What this module is
//! Implements [`RuleStore`] on a single rules table (default `casbin_rules`):
//!
//! ```text
//! id BIGSERIAL | ptype | v0 | v1 | v2 | v3 | v4 | v5
//! ```
//!
//! One row per policy (`p`) or grouping (`g`) rule. Unused value slots hold the
//! empty string, which lets a unique index span the whole tuple.
//!
//! # Key invariants
//! - `(ptype, v0..v5)` is unique; inserts use `ON CONFLICT DO NOTHING`, so
//!   replaying a batch never duplicates rows.
//! - A batch is written in one transaction: either every new row lands or none.
//! - Rows load in `id` order, i.e. insertion order.
//!
//! # Security notes
//! - Database URLs may contain credentials; avoid logging them.
//! - The table name is the only dynamic SQL. It is validated as a plain
//!   identifier before it is ever formatted into a query.
//!
//! # Operational notes
//! - The table and its unique index are created at connect time if missing,
//!   so handlers can assume the schema exists.
//! - Connection pooling/timeouts are explicitly configured because hanging
//!   forever on DB failures is unacceptable for an authorization dependency.
use super::{RuleStore, StoreError, StoreResult};
use crate::config::PostgresConfig;
use crate::rbac::policy_store::RuleRow;
use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Durable rule store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use authorization::config::PostgresConfig;
/// use authorization::store::postgres::PostgresRuleStore;
///
/// async fn open(pg: PostgresConfig) {
///     let _ = PostgresRuleStore::connect(&pg, "casbin_rules").await;
/// }
/// ```
pub struct PostgresRuleStore {
    pool: PgPool,
    table: String,
}

impl PostgresRuleStore {
    /// Connect to Postgres and make sure the rules table exists.
    ///
    /// # Errors
    /// - Invalid table name, connection timeout, or schema setup failure.
    pub async fn connect(pg: &PostgresConfig, table: &str) -> StoreResult<Self> {
        validate_table_name(table)?;
        // - `max_connections` caps concurrent DB work and protects the DB from overload.
        // - `acquire_timeout` bounds how long a request waits for a pooled connection.
        // - the outer timeout bounds establishing the first physical connection.
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| anyhow!("timed out connecting to postgres"))??;
        Self::from_pool(pool, table).await
    }

    /// Wrap an existing pool, creating the rules table if needed.
    pub async fn from_pool(pool: PgPool, table: &str) -> StoreResult<Self> {
        validate_table_name(table)?;
        let store = Self {
            pool,
            table: table.to_string(),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let table = &self.table;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id BIGSERIAL PRIMARY KEY, \
                ptype VARCHAR(8) NOT NULL DEFAULT '', \
                v0 TEXT NOT NULL DEFAULT '', \
                v1 TEXT NOT NULL DEFAULT '', \
                v2 TEXT NOT NULL DEFAULT '', \
                v3 TEXT NOT NULL DEFAULT '', \
                v4 TEXT NOT NULL DEFAULT '', \
                v5 TEXT NOT NULL DEFAULT '')"
        ))
        .execute(&self.pool)
        .await?;
        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {table}_rule_key \
             ON {table} (ptype, v0, v1, v2, v3, v4, v5)"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for PostgresRuleStore {
    async fn load_all(&self) -> StoreResult<Vec<RuleRow>> {
        let rows: Vec<RuleRow> = sqlx::query_as(&format!(
            "SELECT ptype, v0, v1, v2, v3, v4, v5 FROM {} ORDER BY id",
            self.table
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn insert_batch(&self, rows: &[RuleRow]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let query = format!(
            "INSERT INTO {} (ptype, v0, v1, v2, v3, v4, v5) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT DO NOTHING",
            self.table
        );
        // One transaction per batch so a failure leaves no partial rule set behind.
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(&query)
                .bind(&row.ptype)
                .bind(&row.v0)
                .bind(&row.v1)
                .bind(&row.v2)
                .bind(&row.v3)
                .bind(&row.v4)
                .bind(&row.v5)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn exists(&self, row: &RuleRow) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} \
             WHERE ptype = $1 AND v0 = $2 AND v1 = $3 AND v2 = $4 \
             AND v3 = $5 AND v4 = $6 AND v5 = $7)",
            self.table
        ))
        .bind(&row.ptype)
        .bind(&row.v0)
        .bind(&row.v1)
        .bind(&row.v2)
        .bind(&row.v3)
        .bind(&row.v4)
        .bind(&row.v5)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn is_durable(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Accept only `[A-Za-z_][A-Za-z0-9_]*` (max 63 bytes, the Postgres identifier limit).
fn validate_table_name(table: &str) -> StoreResult<()> {
    let mut chars = table.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_start && valid_rest && table.len() <= 63 {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}
