//! Policy text parsing.
//!
//! # Purpose and responsibility
//! Turns bulk rule definitions into typed [`Rule`]s. The input is CSV with a
//! variable number of columns per row:
//!
//! - `p, <subject>, <domain>, <object>, <action>`: policy rule; a blank object
//!   means "no specific object".
//! - `g, <subject>, <group>[, <domain>]`: grouping rule; without a domain the
//!   membership belongs to the default (empty) domain only.
//!
//! Blank rows are skipped. Fields are taken verbatim: surrounding whitespace
//! is kept, and there is no comment syntax, so a `#p` row is an unknown type.
//!
//! # Key invariants
//! - Parsing is all-or-nothing: the first bad row aborts with an error naming
//!   its line and discriminator, and no rules are returned.
//! - Parsing never touches storage; inserting the rules is the caller's job.
use crate::rbac::policy_store::{GroupingRule, PTYPE_GROUPING, PTYPE_POLICY, PolicyRule, Rule};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown policy type: {ptype} (line {line})")]
    UnknownPolicyType { line: u64, ptype: String },
    #[error("policy type {ptype} expects {expected} fields, found {found} (line {line})")]
    FieldCount {
        line: u64,
        ptype: &'static str,
        expected: &'static str,
        found: usize,
    },
    #[error("failed to read policy content")]
    Csv(#[from] csv::Error),
}

impl ParseError {
    /// The 1-based line of the offending row, when known.
    pub fn line(&self) -> Option<u64> {
        match self {
            ParseError::UnknownPolicyType { line, .. } | ParseError::FieldCount { line, .. } => {
                Some(*line)
            }
            ParseError::Csv(err) => err.position().map(|pos| pos.line()),
        }
    }

    /// The row discriminator that failed, when the row got that far.
    pub fn ptype(&self) -> Option<&str> {
        match self {
            ParseError::UnknownPolicyType { ptype, .. } => Some(ptype.as_str()),
            ParseError::FieldCount { ptype, .. } => Some(*ptype),
            ParseError::Csv(_) => None,
        }
    }
}

/// Parse `content` into rules, in file order.
pub fn parse_policy_text(content: &str) -> Result<Vec<Rule>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(content.as_bytes());

    let mut rules = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let fields: Vec<&str> = record.iter().collect();
        let Some((ptype, values)) = fields.split_first() else {
            continue;
        };
        rules.push(parse_record(line, ptype, values)?);
    }
    Ok(rules)
}

fn parse_record(line: u64, ptype: &str, values: &[&str]) -> Result<Rule, ParseError> {
    match ptype {
        PTYPE_POLICY => match values {
            [subject, domain, object, action] => Ok(Rule::Policy(PolicyRule::new(
                *subject, *domain, *object, *action,
            ))),
            _ => Err(ParseError::FieldCount {
                line,
                ptype: PTYPE_POLICY,
                expected: "4",
                found: values.len(),
            }),
        },
        PTYPE_GROUPING => match values {
            [subject, group] => Ok(Rule::Grouping(GroupingRule::unscoped(*subject, *group))),
            [subject, group, domain] => Ok(Rule::Grouping(GroupingRule::in_domain(
                *subject, *group, *domain,
            ))),
            _ => Err(ParseError::FieldCount {
                line,
                ptype: PTYPE_GROUPING,
                expected: "2 or 3",
                found: values.len(),
            }),
        },
        other => Err(ParseError::UnknownPolicyType {
            line,
            ptype: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::policy_store::OBJECT_NONE;

    #[test]
    fn parses_policy_and_grouping_rows() {
        let rules = parse_policy_text(
            "p,alice,tenant1,doc1,read\ng,alice,editors,tenant1\ng,bob,staff\n",
        )
        .expect("parse");
        assert_eq!(
            rules,
            vec![
                Rule::Policy(PolicyRule::new("alice", "tenant1", "doc1", "read")),
                Rule::Grouping(GroupingRule::in_domain("alice", "editors", "tenant1")),
                Rule::Grouping(GroupingRule::unscoped("bob", "staff")),
            ]
        );
    }

    #[test]
    fn unknown_discriminator_is_named() {
        let err = parse_policy_text("p,alice,tenant1,doc1,read\nx,a,b,c\n").expect_err("x row");
        assert!(matches!(
            &err,
            ParseError::UnknownPolicyType { line: 2, ptype } if ptype == "x"
        ));
        assert_eq!(err.ptype(), Some("x"));
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("unknown policy type: x"));
    }

    #[test]
    fn blank_rows_are_skipped() {
        let rules = parse_policy_text("\np,alice,tenant1,doc1,read\n\n,,\n").expect("parse");
        assert_eq!(rules.len(), 1);
        assert!(parse_policy_text("").expect("empty").is_empty());
    }

    #[test]
    fn hash_prefixed_rows_are_not_comments() {
        let err = parse_policy_text("p,alice,tenant1,doc1,read\n#p,bob,tenant1,doc1,read\n")
            .expect_err("#p row");
        assert!(matches!(
            &err,
            ParseError::UnknownPolicyType { line: 2, ptype } if ptype == "#p"
        ));
    }

    #[test]
    fn fields_are_kept_verbatim() {
        let rules = parse_policy_text("p, alice ,tenant1,\"reports,2024\", read\n").expect("parse");
        assert_eq!(
            rules,
            vec![Rule::Policy(PolicyRule::new(
                " alice ",
                "tenant1",
                "reports,2024",
                " read"
            ))]
        );
        let err = parse_policy_text(" p,alice,tenant1,doc1,read\n").expect_err("padded ptype");
        assert_eq!(err.ptype(), Some(" p"));
    }

    #[test]
    fn blank_policy_object_becomes_sentinel() {
        let rules = parse_policy_text("p,admins,tenant1,,manage").expect("parse");
        let Rule::Policy(policy) = &rules[0] else {
            panic!("expected policy rule");
        };
        assert_eq!(policy.object, OBJECT_NONE);
    }

    #[test]
    fn wrong_field_counts_are_rejected() {
        let err = parse_policy_text("p,alice,tenant1,read").expect_err("short p");
        assert!(matches!(
            err,
            ParseError::FieldCount {
                ptype: "p",
                found: 3,
                ..
            }
        ));
        let err = parse_policy_text("g,alice").expect_err("short g");
        assert!(matches!(err, ParseError::FieldCount { ptype: "g", .. }));
        let err = parse_policy_text("g,alice,editors,tenant1,extra").expect_err("long g");
        assert!(matches!(err, ParseError::FieldCount { found: 4, .. }));
    }
}
