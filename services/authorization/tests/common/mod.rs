#![allow(dead_code)]

use async_trait::async_trait;
use authorization::rbac::model::ModelDefinition;
use authorization::rbac::policy_store::RuleRow;
use authorization::store::memory::InMemoryRuleStore;
use authorization::store::{RuleStore, StoreError, StoreResult};
use authorization::{AccessRequest, AuditLogger, AuthorizationService};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const SCENARIO: &str = "\
p,alice,tenant1,doc1,read
g,alice,editors,tenant1
p,editors,tenant1,doc1,write
";

/// Rule store that can be told to reject reads or writes. Counts insert batches.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryRuleStore,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    batches: AtomicUsize,
}

impl FlakyStore {
    pub fn over(inner: InMemoryRuleStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RuleStore for FlakyStore {
    async fn load_all(&self) -> StoreResult<Vec<RuleRow>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unexpected(anyhow::anyhow!("read rejected")));
        }
        self.inner.load_all().await
    }

    async fn insert_batch(&self, rows: &[RuleRow]) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unexpected(anyhow::anyhow!("write rejected")));
        }
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_batch(rows).await
    }

    async fn exists(&self, row: &RuleRow) -> StoreResult<bool> {
        self.inner.exists(row).await
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.inner.health_check().await
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

pub async fn service_over(store: Arc<dyn RuleStore>) -> AuthorizationService {
    AuthorizationService::new(
        store,
        ModelDefinition::embedded().expect("model"),
        AuditLogger::new(true),
    )
    .await
    .expect("service")
}

pub async fn memory_service() -> (AuthorizationService, InMemoryRuleStore) {
    let store = InMemoryRuleStore::new();
    let service = service_over(Arc::new(store.clone())).await;
    (service, store)
}

pub fn allowed(service: &AuthorizationService, sub: &str, dom: &str, obj: &str, act: &str) -> bool {
    match service.check_access(&AccessRequest::new(sub, dom, obj, act)) {
        Ok(()) => true,
        Err(err) if err.is_access_denied() => false,
        Err(err) => panic!("unexpected evaluation failure: {err}"),
    }
}
