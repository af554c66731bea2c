//! Domain-scoped role membership graph.
//!
//! # Purpose and responsibility
//! Holds the `member -> group` edges declared by grouping rules and answers
//! reachability questions ("is alice transitively an editor in tenant1?").
//!
//! # Key invariants and assumptions
//! - Every edge belongs to exactly one domain and is only followed for
//!   requests in that domain. A grouping rule without a domain lives in the
//!   default (empty) domain.
//! - Traversal keeps a visited set, so membership cycles terminate.
//!
//! # Security considerations
//! - Domain scoping is mandatory to prevent cross-tenant inheritance.
use crate::rbac::policy_store::GroupingRule;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    /// Edges keyed by domain, then by member.
    edges: HashMap<String, HashMap<String, BTreeSet<String>>>,
}

impl RoleGraph {
    /// Add the edge described by `rule`. Returns `false` if it was already present.
    pub fn add_link(&mut self, rule: &GroupingRule) -> bool {
        self.edges
            .entry(rule.domain.clone())
            .or_default()
            .entry(rule.subject.clone())
            .or_default()
            .insert(rule.group.clone())
    }

    fn direct_groups<'a>(&'a self, member: &str, domain: &str) -> impl Iterator<Item = &'a str> {
        self.edges
            .get(domain)
            .and_then(|edges| edges.get(member))
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Every name reachable from `subject` in `domain`, including `subject` itself.
    pub fn reachable<'a>(&'a self, subject: &'a str, domain: &str) -> HashSet<&'a str> {
        let mut visited = HashSet::from([subject]);
        let mut queue = VecDeque::from([subject]);
        while let Some(member) = queue.pop_front() {
            for group in self.direct_groups(member, domain) {
                if visited.insert(group) {
                    queue.push_back(group);
                }
            }
        }
        visited
    }

    /// Groups reachable from `subject` in `domain`, nearest first, excluding `subject`.
    pub fn implicit_roles(&self, subject: &str, domain: &str) -> Vec<String> {
        let mut visited = HashSet::from([subject]);
        let mut queue = VecDeque::from([subject]);
        let mut roles = Vec::new();
        while let Some(member) = queue.pop_front() {
            for group in self.direct_groups(member, domain) {
                if visited.insert(group) {
                    roles.push(group.to_string());
                    queue.push_back(group);
                }
            }
        }
        roles
    }
}
