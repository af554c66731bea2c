//! RBAC policy/grouping models.
//!
//! # Purpose
//! Defines the policy and grouping rule shapes shared by the enforcer, the
//! policy loader, and the rule stores, plus the fixed-width row form they are
//! persisted as.
//!
//! # Key invariants
//! - A stored policy object is never empty; "no specific object" is [`OBJECT_NONE`].
//! - A grouping rule without a domain belongs to the default domain `""`; it
//!   never applies to requests for a named domain.
//! - `Rule` and `RuleRow` convert losslessly for every valid rule.
use crate::store::StoreError;
use std::fmt;

/// Object value for domain-level or action-level permissions.
pub const OBJECT_NONE: &str = "-";

pub const PTYPE_POLICY: &str = "p";
pub const PTYPE_GROUPING: &str = "g";

/// Replace an empty object with [`OBJECT_NONE`].
pub fn normalize_object(object: String) -> String {
    if object.is_empty() {
        OBJECT_NONE.to_string()
    } else {
        object
    }
}

/// "subject may perform action on object within domain".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PolicyRule {
    pub subject: String,
    pub domain: String,
    pub object: String,
    pub action: String,
}

impl PolicyRule {
    pub fn new(
        subject: impl Into<String>,
        domain: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            domain: domain.into(),
            object: normalize_object(object.into()),
            action: action.into(),
        }
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p, {}, {}, {}, {}",
            self.subject, self.domain, self.object, self.action
        )
    }
}

/// "subject is a member of group within domain".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupingRule {
    pub subject: String,
    pub group: String,
    /// Empty for the default domain.
    pub domain: String,
}

impl GroupingRule {
    /// Membership in the default domain, as written by a two-field `g` row.
    pub fn unscoped(subject: impl Into<String>, group: impl Into<String>) -> Self {
        Self::in_domain(subject, group, "")
    }

    pub fn in_domain(
        subject: impl Into<String>,
        group: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            group: group.into(),
            domain: domain.into(),
        }
    }
}

impl fmt::Display for GroupingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.domain.is_empty() {
            write!(f, "g, {}, {}", self.subject, self.group)
        } else {
            write!(f, "g, {}, {}, {}", self.subject, self.group, self.domain)
        }
    }
}

/// A single policy or grouping rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Rule {
    Policy(PolicyRule),
    Grouping(GroupingRule),
}

impl Rule {
    pub fn ptype(&self) -> &'static str {
        match self {
            Rule::Policy(_) => PTYPE_POLICY,
            Rule::Grouping(_) => PTYPE_GROUPING,
        }
    }

    pub fn to_row(&self) -> RuleRow {
        match self {
            Rule::Policy(policy) => RuleRow {
                ptype: PTYPE_POLICY.to_string(),
                v0: policy.subject.clone(),
                v1: policy.domain.clone(),
                v2: policy.object.clone(),
                v3: policy.action.clone(),
                ..RuleRow::default()
            },
            Rule::Grouping(grouping) => RuleRow {
                ptype: PTYPE_GROUPING.to_string(),
                v0: grouping.subject.clone(),
                v1: grouping.group.clone(),
                v2: grouping.domain.clone(),
                ..RuleRow::default()
            },
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Policy(policy) => policy.fmt(f),
            Rule::Grouping(grouping) => grouping.fmt(f),
        }
    }
}

impl From<PolicyRule> for Rule {
    fn from(rule: PolicyRule) -> Self {
        Rule::Policy(rule)
    }
}

impl From<GroupingRule> for Rule {
    fn from(rule: GroupingRule) -> Self {
        Rule::Grouping(rule)
    }
}

/// Persisted rule row: a type discriminator plus six positional value slots.
///
/// Unused slots hold the empty string so the whole tuple can carry a unique
/// index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct RuleRow {
    pub ptype: String,
    pub v0: String,
    pub v1: String,
    pub v2: String,
    pub v3: String,
    pub v4: String,
    pub v5: String,
}

impl RuleRow {
    pub fn values(&self) -> [&str; 6] {
        [&self.v0, &self.v1, &self.v2, &self.v3, &self.v4, &self.v5]
    }
}

impl TryFrom<RuleRow> for Rule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        match row.ptype.as_str() {
            PTYPE_POLICY => {
                if !row.v4.is_empty() || !row.v5.is_empty() {
                    return Err(invalid_row(&row, "policy rows use four value slots"));
                }
                if row.v2.is_empty() {
                    return Err(invalid_row(&row, "policy object is empty"));
                }
                Ok(Rule::Policy(PolicyRule {
                    subject: row.v0,
                    domain: row.v1,
                    object: row.v2,
                    action: row.v3,
                }))
            }
            PTYPE_GROUPING => {
                if !row.v3.is_empty() || !row.v4.is_empty() || !row.v5.is_empty() {
                    return Err(invalid_row(&row, "grouping rows use at most three value slots"));
                }
                Ok(Rule::Grouping(GroupingRule::in_domain(row.v0, row.v1, row.v2)))
            }
            _ => Err(invalid_row(&row, "unknown rule type")),
        }
    }
}

fn invalid_row(row: &RuleRow, reason: &str) -> StoreError {
    StoreError::InvalidRow(format!(
        "{reason}: {}, {}",
        row.ptype,
        row.values().join(", ")
    ))
}
