//! Authorization service library crate.
//!
//! # Purpose
//! Domain-scoped RBAC: policies grant `(subject, domain, object, action)`,
//! grouping rules make subjects members of roles, and access checks follow
//! role membership within the requested domain. Rules are persisted through a
//! pluggable [`store::RuleStore`] and evaluated from memory.
//!
//! # Notes
//! [`service::AuthorizationService`] is the entry point; the `rbac` modules
//! hold the rule model and can be used without a store.
pub mod audit;
pub mod config;
pub mod error;
pub mod observability;
pub mod rbac;
pub mod service;
pub mod store;
#[cfg(test)]
mod test_support;

pub use audit::AuditLogger;
pub use error::{AccessDenied, AuthzError};
pub use rbac::enforcer::AccessRequest;
pub use rbac::policy_store::{GroupingRule, OBJECT_NONE, PolicyRule, Rule};
pub use service::{AddPolicyRequest, AuthorizationService};
