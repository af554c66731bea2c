//! Matching-model definition loading and validation.
//!
//! # Purpose
//! Parses the declarative model text (`[request_definition]`, `[matchers]`, ...)
//! loaded once at startup and checks that it states exactly the matching
//! semantics the enforcer implements.
//!
//! # Key invariants
//! - The matcher expression is an external contract. Any model whose request,
//!   policy, role, effect, or matcher definition differs from the supported one
//!   is rejected, because accepting it would silently change outcomes.
//! - Whitespace inside values is not significant.
use crate::rbac::MODEL_CONF;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// `(section, key, value)` triples the enforcer implements.
const SUPPORTED: [(&str, &str, &str); 5] = [
    ("request_definition", "r", "sub, dom, obj, act"),
    ("policy_definition", "p", "sub, dom, obj, act"),
    ("role_definition", "g", "_, _, _"),
    ("policy_effect", "e", "some(where (p.eft == allow))"),
    (
        "matchers",
        "m",
        "g(r.sub, p.sub, r.dom) && r.dom == p.dom && r.obj == p.obj && r.act == p.act",
    ),
];

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("model syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("model is missing [{section}] {key}")]
    Missing {
        section: &'static str,
        key: &'static str,
    },
    #[error("unsupported [{section}] {key} = {found}; expected {expected}")]
    Unsupported {
        section: &'static str,
        key: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// A validated matching-model definition.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl ModelDefinition {
    /// The model compiled into the binary.
    pub fn embedded() -> Result<Self, ModelError> {
        MODEL_CONF.parse()
    }

    pub async fn from_file(path: &Path) -> Result<Self, ModelError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|source| ModelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        text.parse()
    }

    /// The matcher expression, as written in the definition.
    pub fn matcher(&self) -> &str {
        self.get("matchers", "m").unwrap_or_default()
    }

    pub fn sections(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.sections
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    fn validate(&self) -> Result<(), ModelError> {
        for (section, key, expected) in SUPPORTED {
            let found = self
                .get(section, key)
                .ok_or(ModelError::Missing { section, key })?;
            if squash(found) != squash(expected) {
                return Err(ModelError::Unsupported {
                    section,
                    key,
                    expected,
                    found: found.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl FromStr for ModelDefinition {
    type Err = ModelError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
        let mut current: Option<String> = None;
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[') {
                let name = name.strip_suffix(']').ok_or_else(|| ModelError::Syntax {
                    line: idx + 1,
                    message: "unterminated section header".to_string(),
                })?;
                sections.entry(name.trim().to_string()).or_default();
                current = Some(name.trim().to_string());
                continue;
            }
            let Some(section) = current.as_ref() else {
                return Err(ModelError::Syntax {
                    line: idx + 1,
                    message: "definition outside of a section".to_string(),
                });
            };
            let (key, value) = line.split_once('=').ok_or_else(|| ModelError::Syntax {
                line: idx + 1,
                message: "expected `key = value`".to_string(),
            })?;
            sections
                .entry(section.clone())
                .or_default()
                .insert(key.trim().to_string(), value.trim().to_string());
        }
        let model = Self { sections };
        model.validate()?;
        Ok(model)
    }
}

fn squash(value: &str) -> String {
    value.chars().filter(|c| !c.is_whitespace()).collect()
}
