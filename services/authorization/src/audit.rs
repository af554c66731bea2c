//! Audit logging for model loading, enforcement decisions, and rule changes.
//!
//! # Purpose
//! The service receives an [`AuditLogger`] at construction instead of reaching
//! for a global. Entries go through `tracing` under the `authorization::audit`
//! target, so the subscriber installed by the binary decides where they land
//! (`RUST_LOG=authorization::audit=off` silences them at runtime).
//!
//! # Notes
//! A disabled logger emits nothing; the toggle is checked per call.
use crate::rbac::enforcer::{AccessRequest, Decision};
use crate::rbac::model::ModelDefinition;
use crate::rbac::policy_store::Rule;

#[derive(Debug, Clone, Copy, Default)]
pub struct AuditLogger {
    enabled: bool,
}

impl AuditLogger {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn enable_log(&mut self, enable: bool) {
        self.enabled = enable;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn log_model(&self, model: &ModelDefinition) {
        if !self.enabled {
            return;
        }
        for (section, entries) in model.sections() {
            for (key, value) in entries {
                tracing::info!(
                    target: "authorization::audit",
                    section = %section,
                    key = %key,
                    value = %value,
                    "model"
                );
            }
        }
    }

    pub fn log_enforce(&self, matcher: &str, request: &AccessRequest, decision: &Decision) {
        if !self.enabled {
            return;
        }
        let matched = decision
            .matched
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        tracing::info!(
            target: "authorization::audit",
            subject = %request.subject,
            domain = %request.domain,
            object = %request.object,
            action = %request.action,
            matcher = %matcher,
            result = decision.allowed,
            matched = %matched,
            "enforce"
        );
    }

    pub fn log_rule_counts(&self, policies: usize, groupings: usize) {
        if !self.enabled {
            return;
        }
        tracing::info!(
            target: "authorization::audit",
            policies,
            groupings,
            "rules loaded"
        );
    }

    pub fn log_rules_added(&self, operation: &str, rules: &[Rule]) {
        if !self.enabled {
            return;
        }
        for rule in rules {
            tracing::info!(
                target: "authorization::audit",
                operation = %operation,
                ptype = rule.ptype(),
                rule = %rule,
                "rule added"
            );
        }
    }

    pub fn log_error(&self, operation: &str, err: &(dyn std::error::Error + 'static)) {
        if !self.enabled {
            return;
        }
        tracing::error!(
            target: "authorization::audit",
            operation = %operation,
            error = %crate::error::error_chain(err),
            "authorization error"
        );
    }
}
