//! Error taxonomy for the authorization service.
//!
//! Denials are ordinary outcomes and carry the request that was refused;
//! everything else is a failure the caller must treat as "not authorized"
//! without reporting it as a policy decision.
use crate::rbac::loader::ParseError;
use crate::rbac::model::ModelError;
use crate::rbac::policy_store::OBJECT_NONE;
use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// The request tuple that no policy granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDenied {
    pub subject: String,
    pub domain: String,
    pub object: String,
    pub action: String,
}

impl fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "access denied for subject '{}' and domain '{}'",
            self.subject, self.domain
        )?;
        if !self.object.is_empty() && self.object != OBJECT_NONE {
            write!(f, " and object '{}'", self.object)?;
        }
        write!(f, " and action '{}'", self.action)
    }
}

#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("failed to load authorization model")]
    ModelLoad(#[from] ModelError),
    #[error("failed to initialize rule store")]
    StoreConnect(#[source] StoreError),
    #[error("authorization evaluation failed: {0}")]
    Evaluation(String),
    #[error("{0}")]
    AccessDenied(AccessDenied),
    #[error("failed to parse policy text")]
    Parse(#[from] ParseError),
    #[error("failed to persist rules")]
    PersistenceWrite(#[source] StoreError),
    #[error("failed to read rules from store")]
    StoreRead(#[source] StoreError),
}

impl AuthzError {
    pub fn is_access_denied(&self) -> bool {
        matches!(self, AuthzError::AccessDenied(_))
    }

    /// The refused request, if this is a denial.
    pub fn access_denied(&self) -> Option<&AccessDenied> {
        match self {
            AuthzError::AccessDenied(denied) => Some(denied),
            _ => None,
        }
    }

    /// Short label used for span status and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthzError::ModelLoad(_) => "model_load",
            AuthzError::StoreConnect(_) => "store_connect",
            AuthzError::Evaluation(_) => "evaluation",
            AuthzError::AccessDenied(_) => "access_denied",
            AuthzError::Parse(_) => "parse",
            AuthzError::PersistenceWrite(_) => "persistence_write",
            AuthzError::StoreRead(_) => "store_read",
        }
    }
}

/// Render an error and its source chain on one line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denied(object: &str) -> AuthzError {
        AuthzError::AccessDenied(AccessDenied {
            subject: "bob".to_string(),
            domain: "tenant1".to_string(),
            object: object.to_string(),
            action: "read".to_string(),
        })
    }

    #[test]
    fn denial_message_names_the_request() {
        assert_eq!(
            denied("doc1").to_string(),
            "access denied for subject 'bob' and domain 'tenant1' and object 'doc1' and action 'read'"
        );
        assert_eq!(
            denied(OBJECT_NONE).to_string(),
            "access denied for subject 'bob' and domain 'tenant1' and action 'read'"
        );
    }

    #[test]
    fn denial_is_distinguishable_from_failures() {
        let err = denied("doc1");
        assert!(err.is_access_denied());
        assert_eq!(err.access_denied().map(|d| d.subject.as_str()), Some("bob"));
        assert_eq!(err.kind(), "access_denied");

        let failure = AuthzError::Evaluation("rule model lock poisoned".to_string());
        assert!(!failure.is_access_denied());
        assert!(failure.access_denied().is_none());
    }

    #[test]
    fn error_chain_includes_sources() {
        let err = AuthzError::PersistenceWrite(StoreError::InvalidTable("bad-name".to_string()));
        assert_eq!(
            error_chain(&err),
            "failed to persist rules: invalid rules table name: bad-name"
        );
    }
}
