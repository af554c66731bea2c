//! In-memory rule model and request matching for tenant-scoped RBAC.
//!
//! # Purpose and responsibility
//! Holds every loaded policy and grouping rule and evaluates access requests
//! against them.
//!
//! # Key invariants and assumptions
//! - No two identical policy or grouping rules are held; `insert` is idempotent.
//! - A request is allowed iff some policy `(ps, dom, obj, act)` matches the
//!   request's domain, object, and action exactly and the request subject
//!   reaches `ps` through grouping edges valid in that domain.
//! - There are no deny rules; any single matching policy grants access.
//!
//! # Security considerations
//! - Domain comparison is exact; there is no wildcard domain.
//! - Callers must normalize an empty request object to [`OBJECT_NONE`] first
//!   (see [`AccessRequest::normalized`]).
use crate::rbac::policy_store::{GroupingRule, OBJECT_NONE, PolicyRule, Rule, normalize_object};
use crate::rbac::role_graph::RoleGraph;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// A single access question: may `subject` perform `action` on `object` in `domain`?
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessRequest {
    pub subject: String,
    pub domain: String,
    #[serde(default)]
    pub object: String,
    pub action: String,
}

impl AccessRequest {
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

    /// Copy of the request with an empty object replaced by [`OBJECT_NONE`].
    pub fn normalized(&self) -> Self {
        Self {
            object: normalize_object(self.object.clone()),
            ..self.clone()
        }
    }

    pub fn has_object(&self) -> bool {
        !self.object.is_empty() && self.object != OBJECT_NONE
    }
}

/// Outcome of one enforcement, with the policy that granted access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub matched: Option<PolicyRule>,
}

impl Decision {
    fn deny() -> Self {
        Self {
            allowed: false,
            matched: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleModel {
    policies: Vec<PolicyRule>,
    policy_set: HashSet<PolicyRule>,
    /// Positions in `policies`, keyed by domain.
    policies_by_domain: HashMap<String, Vec<usize>>,
    groupings: Vec<GroupingRule>,
    grouping_set: HashSet<GroupingRule>,
    roles: RoleGraph,
}

impl RuleModel {
    pub fn from_rules(rules: impl IntoIterator<Item = Rule>) -> Self {
        let mut model = Self::default();
        for rule in rules {
            model.insert(rule);
        }
        model
    }

    pub fn contains(&self, rule: &Rule) -> bool {
        match rule {
            Rule::Policy(policy) => self.policy_set.contains(policy),
            Rule::Grouping(grouping) => self.grouping_set.contains(grouping),
        }
    }

    /// Insert `rule`; returns `false` when an identical rule is already held.
    pub fn insert(&mut self, rule: Rule) -> bool {
        match rule {
            Rule::Policy(policy) => {
                if self.policy_set.contains(&policy) {
                    return false;
                }
                self.policies_by_domain
                    .entry(policy.domain.clone())
                    .or_default()
                    .push(self.policies.len());
                self.policy_set.insert(policy.clone());
                self.policies.push(policy);
                true
            }
            Rule::Grouping(grouping) => {
                if !self.grouping_set.insert(grouping.clone()) {
                    return false;
                }
                self.roles.add_link(&grouping);
                self.groupings.push(grouping);
                true
            }
        }
    }

    /// Evaluate `request` (already normalized) against the loaded rules.
    pub fn enforce(&self, request: &AccessRequest) -> Decision {
        let Some(positions) = self.policies_by_domain.get(&request.domain) else {
            return Decision::deny();
        };
        // Step 1: Narrow to policies for this object and action.
        let mut candidates = positions
            .iter()
            .map(|&idx| &self.policies[idx])
            .filter(|policy| policy.object == request.object && policy.action == request.action)
            .peekable();
        if candidates.peek().is_none() {
            return Decision::deny();
        }
        // Step 2: Expand the subject's roles once, then match any candidate subject.
        let reachable = self.roles.reachable(&request.subject, &request.domain);
        match candidates.find(|policy| reachable.contains(policy.subject.as_str())) {
            Some(policy) => Decision {
                allowed: true,
                matched: Some(policy.clone()),
            },
            None => Decision::deny(),
        }
    }

    pub fn policies(&self) -> &[PolicyRule] {
        &self.policies
    }

    pub fn groupings(&self) -> &[GroupingRule] {
        &self.groupings
    }

    pub fn implicit_roles(&self, subject: &str, domain: &str) -> Vec<String> {
        self.roles.implicit_roles(subject, domain)
    }

    /// Policies in `domain` granted to `subject` directly or through its roles.
    pub fn implicit_permissions(&self, subject: &str, domain: &str) -> Vec<PolicyRule> {
        let Some(positions) = self.policies_by_domain.get(domain) else {
            return Vec::new();
        };
        let reachable = self.roles.reachable(subject, domain);
        positions
            .iter()
            .map(|&idx| &self.policies[idx])
            .filter(|policy| reachable.contains(policy.subject.as_str()))
            .cloned()
            .collect()
    }
}
