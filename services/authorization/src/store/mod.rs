//! Rule persistence.
//!
//! # Purpose
//! Durable storage of rule rows: one row per policy or grouping rule, keyed by
//! a type discriminator plus six positional value slots. Stores hold no
//! domain logic; the service decides what to insert.
use crate::rbac::policy_store::RuleRow;
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("invalid rules table name: {0}")]
    InvalidTable(String),
    #[error("invalid rule row: {0}")]
    InvalidRow(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Every stored row, in insertion order.
    async fn load_all(&self) -> StoreResult<Vec<RuleRow>>;
    /// Insert `rows` as one unit. Rows that already exist are left untouched.
    async fn insert_batch(&self, rows: &[RuleRow]) -> StoreResult<()>;
    async fn exists(&self, row: &RuleRow) -> StoreResult<bool>;

    async fn health_check(&self) -> StoreResult<()>;
    fn is_durable(&self) -> bool;
    fn backend_name(&self) -> &'static str;
}
