//! In-memory implementation of the rule store.
//!
//! # Purpose
//! Implements [`RuleStore`] with a `Vec` guarded by `tokio::sync::RwLock`. It
//! exists for:
//! - local development and tests (no external dependencies)
//! - deployments where durability is not required
//!
//! # Durability and consistency
//! - **Not durable**: all rows are lost on process restart.
//! - Clones share the same rows, so a second service built over a clone sees
//!   everything the first one wrote. Tests use this to simulate a restart.
//! - `insert_batch` applies the whole batch under one write lock.
use super::{RuleStore, StoreResult};
use crate::rbac::policy_store::RuleRow;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleStore {
    /// Rows in insertion order; never contains duplicates.
    rows: Arc<RwLock<Vec<RuleRow>>>,
}

impl InMemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl RuleStore for InMemoryRuleStore {
    async fn load_all(&self) -> StoreResult<Vec<RuleRow>> {
        Ok(self.rows.read().await.clone())
    }

    async fn insert_batch(&self, batch: &[RuleRow]) -> StoreResult<()> {
        // Mirror the durable backend's `ON CONFLICT DO NOTHING`.
        let mut rows = self.rows.write().await;
        for row in batch {
            if !rows.contains(row) {
                rows.push(row.clone());
            }
        }
        Ok(())
    }

    async fn exists(&self, row: &RuleRow) -> StoreResult<bool> {
        Ok(self.rows.read().await.contains(row))
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
