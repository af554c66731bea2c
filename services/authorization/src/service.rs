//! The authorization service: rule model, persistence, and decisions.
//!
//! # Purpose and responsibility
//! [`AuthorizationService`] owns the in-memory rule model and the rule store.
//! It answers access checks from memory and routes every mutation through the
//! store before applying it in memory.
//!
//! # Key invariants and assumptions
//! - Writes are persisted before they are applied; a failed write leaves the
//!   rule model untouched.
//! - One writer at a time: the writer mutex is held across the whole
//!   check-persist-apply sequence.
//! - Readers observe either the complete pre-mutation or the complete
//!   post-mutation rule set, never a partial batch.
//! - Adding a rule that already exists (in memory or in the store) writes
//!   nothing.
//!
//! # Security considerations
//! - Any error other than [`AuthzError::AccessDenied`] means the decision could
//!   not be made. Callers must fail closed.
use crate::audit::AuditLogger;
use crate::config::{AuthzConfig, StorageBackend};
use crate::error::{AccessDenied, AuthzError};
use crate::observability::mark_span_failed;
use crate::rbac::enforcer::{AccessRequest, RuleModel};
use crate::rbac::loader::parse_policy_text;
use crate::rbac::model::ModelDefinition;
use crate::rbac::policy_store::{GroupingRule, PolicyRule, Rule, RuleRow};
use crate::store::memory::InMemoryRuleStore;
use crate::store::postgres::PostgresRuleStore;
use crate::store::{RuleStore, StoreError};
use anyhow::anyhow;
use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::field::Empty;
use tracing::{Instrument, Span};

/// One permission to grant: `subject` may perform `action` on `object` in `domain`.
///
/// An empty `object` grants the action on the domain itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AddPolicyRequest {
    pub subject: String,
    pub domain: String,
    #[serde(default)]
    pub object: String,
    pub action: String,
}

impl AddPolicyRequest {
    pub fn new(
        subject: impl Into<String>,
        domain: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            domain: domain.into(),
            object: object.into(),
            action: action.into(),
        }
    }
}

impl From<&AddPolicyRequest> for PolicyRule {
    fn from(request: &AddPolicyRequest) -> Self {
        PolicyRule::new(
            request.subject.clone(),
            request.domain.clone(),
            request.object.clone(),
            request.action.clone(),
        )
    }
}

pub struct AuthorizationService {
    store: Arc<dyn RuleStore>,
    model: ModelDefinition,
    rules: RwLock<RuleModel>,
    writer: tokio::sync::Mutex<()>,
    audit: AuditLogger,
}

impl AuthorizationService {
    /// Build the service over `store`, loading every stored rule.
    ///
    /// # Errors
    /// - [`AuthzError::StoreConnect`] when the store cannot be read or holds a
    ///   row that is not a valid rule.
    pub async fn new(
        store: Arc<dyn RuleStore>,
        model: ModelDefinition,
        audit: AuditLogger,
    ) -> Result<Self, AuthzError> {
        audit.log_model(&model);
        let rules = load_rules(store.as_ref())
            .await
            .map_err(AuthzError::StoreConnect)?;
        let rule_model = RuleModel::from_rules(rules);
        let (policies, groupings) = (rule_model.policies().len(), rule_model.groupings().len());
        tracing::info!(
            backend = store.backend_name(),
            durable = store.is_durable(),
            policies,
            groupings,
            "authorization rules loaded"
        );
        audit.log_rule_counts(policies, groupings);
        Ok(Self {
            store,
            model,
            rules: RwLock::new(rule_model),
            writer: tokio::sync::Mutex::new(()),
            audit,
        })
    }

    /// Build the model, the configured store, and the service.
    pub async fn from_config(config: &AuthzConfig, audit: AuditLogger) -> Result<Self, AuthzError> {
        let model = match &config.model_path {
            Some(path) => ModelDefinition::from_file(path).await?,
            None => ModelDefinition::embedded()?,
        };
        let store: Arc<dyn RuleStore> = match config.storage {
            StorageBackend::Memory => Arc::new(InMemoryRuleStore::new()),
            StorageBackend::Postgres => {
                let pg = config.postgres.as_ref().ok_or_else(|| {
                    AuthzError::StoreConnect(StoreError::Unexpected(anyhow!(
                        "postgres configuration missing"
                    )))
                })?;
                Arc::new(
                    PostgresRuleStore::connect(pg, &config.rules_table)
                        .await
                        .map_err(AuthzError::StoreConnect)?,
                )
            }
        };
        Self::new(store, model, audit).await
    }

    /// Decide `request`. `Ok(())` means allowed.
    ///
    /// # Errors
    /// - [`AuthzError::AccessDenied`] when no policy grants the request.
    /// - [`AuthzError::Evaluation`] when the rule model is unavailable.
    pub fn check_access(&self, request: &AccessRequest) -> Result<(), AuthzError> {
        let span = tracing::info_span!(
            "CheckAccess",
            subject = %request.subject,
            domain = %request.domain,
            allowed = Empty,
            otel.status_code = Empty,
            otel.status_message = Empty
        );
        let _entered = span.enter();
        let request = request.normalized();
        let decision = match self.read_rules() {
            Ok(rules) => rules.enforce(&request),
            Err(err) => {
                self.record_failure("CheckAccess", &span, &err);
                return Err(err);
            }
        };
        span.record("allowed", decision.allowed);
        self.audit
            .log_enforce(self.model.matcher(), &request, &decision);
        let result = if decision.allowed { "allow" } else { "deny" };
        metrics::counter!("authz_decisions_total", "result" => result).increment(1);
        if decision.allowed {
            Ok(())
        } else {
            // A denial is a decision, not a failure; the span keeps its status.
            Err(AuthzError::AccessDenied(AccessDenied {
                subject: request.subject,
                domain: request.domain,
                object: request.object,
                action: request.action,
            }))
        }
    }

    /// Grant every policy in `requests` as one batch.
    pub async fn add_policy(&self, requests: &[AddPolicyRequest]) -> Result<(), AuthzError> {
        let span = tracing::info_span!(
            "AddPolicy",
            requested = requests.len(),
            otel.status_code = Empty,
            otel.status_message = Empty
        );
        let rules = requests
            .iter()
            .map(|request| Rule::Policy(request.into()))
            .collect();
        self.traced("AddPolicy", span, self.commit("AddPolicy", rules))
            .await
    }

    /// Make `subject` a member of each of `groups` in the default domain.
    ///
    /// The default domain is `""`; these memberships grant nothing in a named
    /// domain. Use [`Self::add_to_group_in_domain`] for tenant roles.
    pub async fn add_to_group(&self, subject: &str, groups: &[&str]) -> Result<(), AuthzError> {
        let span = tracing::info_span!(
            "AddToGroup",
            subject = %subject,
            requested = groups.len(),
            otel.status_code = Empty,
            otel.status_message = Empty
        );
        let rules = groups
            .iter()
            .map(|group| Rule::Grouping(GroupingRule::unscoped(subject, *group)))
            .collect();
        self.traced("AddToGroup", span, self.commit("AddToGroup", rules))
            .await
    }

    /// Make `subject` a member of each of `groups` within `domain` only.
    pub async fn add_to_group_in_domain(
        &self,
        subject: &str,
        domain: &str,
        groups: &[&str],
    ) -> Result<(), AuthzError> {
        let span = tracing::info_span!(
            "AddToGroup",
            subject = %subject,
            domain = %domain,
            requested = groups.len(),
            otel.status_code = Empty,
            otel.status_message = Empty
        );
        let rules = groups
            .iter()
            .map(|group| Rule::Grouping(GroupingRule::in_domain(subject, *group, domain)))
            .collect();
        self.traced("AddToGroup", span, self.commit("AddToGroup", rules))
            .await
    }

    /// Load policy text (see [`crate::rbac::loader`]) and commit the new rules.
    ///
    /// Nothing is written unless the whole text parses.
    pub async fn add_policy_from_csv(&self, content: &str) -> Result<(), AuthzError> {
        let span = tracing::info_span!(
            "LoadFromText",
            bytes = content.len(),
            otel.status_code = Empty,
            otel.status_message = Empty
        );
        self.traced("LoadFromText", span, self.load_text(content))
            .await
    }

    async fn load_text(&self, content: &str) -> Result<(), AuthzError> {
        let rules = parse_policy_text(content)?;
        self.commit("LoadFromText", rules).await
    }

    /// Replace the rule model with the store's current contents.
    ///
    /// Picks up rules written by other instances sharing the store. On error
    /// the previous rule model stays in place.
    pub async fn reload(&self) -> Result<(), AuthzError> {
        let span = tracing::info_span!(
            "Reload",
            otel.status_code = Empty,
            otel.status_message = Empty
        );
        self.traced("Reload", span, self.replace_rules()).await
    }

    async fn replace_rules(&self) -> Result<(), AuthzError> {
        let _writer = self.writer.lock().await;
        let rules = load_rules(self.store.as_ref())
            .await
            .map_err(AuthzError::StoreRead)?;
        let fresh = RuleModel::from_rules(rules);
        let (policies, groupings) = (fresh.policies().len(), fresh.groupings().len());
        *self.write_rules()? = fresh;
        tracing::info!(policies, groupings, "authorization rules reloaded");
        self.audit.log_rule_counts(policies, groupings);
        Ok(())
    }

    pub fn has_policy(&self, rule: &PolicyRule) -> Result<bool, AuthzError> {
        Ok(self.read_rules()?.contains(&Rule::Policy(rule.clone())))
    }

    pub fn has_grouping(&self, rule: &GroupingRule) -> Result<bool, AuthzError> {
        Ok(self.read_rules()?.contains(&Rule::Grouping(rule.clone())))
    }

    /// Every policy rule, in the order it was added.
    pub fn policies(&self) -> Result<Vec<PolicyRule>, AuthzError> {
        Ok(self.read_rules()?.policies().to_vec())
    }

    pub fn groupings(&self) -> Result<Vec<GroupingRule>, AuthzError> {
        Ok(self.read_rules()?.groupings().to_vec())
    }

    /// Every group `subject` belongs to in `domain`, directly or transitively.
    pub fn implicit_roles(&self, subject: &str, domain: &str) -> Result<Vec<String>, AuthzError> {
        Ok(self.read_rules()?.implicit_roles(subject, domain))
    }

    /// Every policy in `domain` that applies to `subject` or one of its roles.
    pub fn implicit_permissions(
        &self,
        subject: &str,
        domain: &str,
    ) -> Result<Vec<PolicyRule>, AuthzError> {
        Ok(self.read_rules()?.implicit_permissions(subject, domain))
    }

    pub async fn health_check(&self) -> Result<(), AuthzError> {
        self.store
            .health_check()
            .await
            .map_err(AuthzError::StoreRead)
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn is_durable(&self) -> bool {
        self.store.is_durable()
    }

    /// Persist the rules in `rules` that are not yet held, then apply them.
    async fn commit(&self, operation: &'static str, rules: Vec<Rule>) -> Result<(), AuthzError> {
        let _writer = self.writer.lock().await;

        // Step 1: Drop duplicates within the batch and rules already in memory.
        let candidates: Vec<Rule> = {
            let model = self.read_rules()?;
            let mut seen = HashSet::new();
            rules
                .into_iter()
                .filter(|rule| !model.contains(rule) && seen.insert(rule.clone()))
                .collect()
        };
        if candidates.is_empty() {
            return Ok(());
        }

        // Step 2: Rules another instance already stored are adopted, not rewritten.
        let mut adopted = Vec::new();
        let mut added = Vec::new();
        for rule in candidates {
            let exists = self
                .store
                .exists(&rule.to_row())
                .await
                .map_err(AuthzError::PersistenceWrite)?;
            if exists {
                adopted.push(rule);
            } else {
                added.push(rule);
            }
        }
        let rows: Vec<RuleRow> = added.iter().map(Rule::to_row).collect();
        self.store
            .insert_batch(&rows)
            .await
            .map_err(AuthzError::PersistenceWrite)?;

        // Step 3: Apply under one exclusive lock so readers never see half a batch.
        {
            let mut model = self.write_rules()?;
            for rule in adopted.iter().chain(&added) {
                model.insert(rule.clone());
            }
        }
        for rule in &added {
            metrics::counter!("authz_rules_added_total", "ptype" => rule.ptype()).increment(1);
        }
        tracing::debug!(
            operation,
            added = added.len(),
            adopted = adopted.len(),
            "rules committed"
        );
        self.audit.log_rules_added(operation, &added);
        Ok(())
    }

    async fn traced<T>(
        &self,
        operation: &'static str,
        span: Span,
        fut: impl Future<Output = Result<T, AuthzError>>,
    ) -> Result<T, AuthzError> {
        let result = fut.instrument(span.clone()).await;
        if let Err(err) = &result {
            self.record_failure(operation, &span, err);
        }
        result
    }

    fn record_failure(&self, operation: &'static str, span: &Span, err: &AuthzError) {
        mark_span_failed(span, err);
        self.audit.log_error(operation, err);
    }

    fn read_rules(&self) -> Result<RwLockReadGuard<'_, RuleModel>, AuthzError> {
        self.rules
            .read()
            .map_err(|_| AuthzError::Evaluation("rule model lock poisoned".to_string()))
    }

    fn write_rules(&self) -> Result<RwLockWriteGuard<'_, RuleModel>, AuthzError> {
        self.rules
            .write()
            .map_err(|_| AuthzError::Evaluation("rule model lock poisoned".to_string()))
    }
}

async fn load_rules(store: &dyn RuleStore) -> Result<Vec<Rule>, StoreError> {
    store
        .load_all()
        .await?
        .into_iter()
        .map(Rule::try_from)
        .collect()
}
