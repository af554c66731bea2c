//! RBAC module wiring and shared constants.
//!
//! # Purpose
//! Exposes the rule shapes, the domain-scoped role graph, the enforcer, the
//! policy text loader, and the matching-model definition.
pub mod enforcer;
pub mod loader;
pub mod model;
pub mod policy_store;
pub mod role_graph;

// Embed the matching model so deployments don't need a separate config file.
pub const MODEL_CONF: &str = include_str!("rbac/model.conf");
