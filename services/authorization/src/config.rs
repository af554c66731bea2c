use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_RULES_TABLE: &str = "casbin_rules";
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => bail!("unknown storage backend: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

// Authorization service configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub rules_table: String,
    /// Model definition file; the embedded model is used when unset.
    pub model_path: Option<PathBuf>,
    /// Policy text loaded into the rule set at startup.
    pub policy_file: Option<PathBuf>,
    pub audit_log: bool,
}

#[derive(Debug, Default, Deserialize)]
struct AuthzConfigOverride {
    storage: Option<StorageBackend>,
    postgres_url: Option<String>,
    postgres_max_connections: Option<u32>,
    postgres_connect_timeout_ms: Option<u64>,
    postgres_acquire_timeout_ms: Option<u64>,
    rules_table: Option<String>,
    model_path: Option<PathBuf>,
    policy_file: Option<PathBuf>,
    audit_log: Option<bool>,
}

impl AuthzConfig {
    pub fn from_env() -> Result<Self> {
        let storage = match std::env::var("AUTHZ_STORAGE") {
            Ok(value) => value.parse().with_context(|| "parse AUTHZ_STORAGE")?,
            Err(_) => StorageBackend::Memory,
        };
        let postgres = match std::env::var("AUTHZ_POSTGRES_URL") {
            Ok(url) => Some(PostgresConfig {
                url,
                max_connections: env_or("AUTHZ_POSTGRES_MAX_CONNECTIONS", DEFAULT_PG_MAX_CONNECTIONS)?,
                connect_timeout_ms: env_or(
                    "AUTHZ_POSTGRES_CONNECT_TIMEOUT_MS",
                    DEFAULT_PG_CONNECT_TIMEOUT_MS,
                )?,
                acquire_timeout_ms: env_or(
                    "AUTHZ_POSTGRES_ACQUIRE_TIMEOUT_MS",
                    DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
                )?,
            }),
            Err(_) => None,
        };
        let rules_table =
            std::env::var("AUTHZ_RULES_TABLE").unwrap_or_else(|_| DEFAULT_RULES_TABLE.to_string());
        let model_path = std::env::var("AUTHZ_MODEL_PATH").ok().map(PathBuf::from);
        let policy_file = std::env::var("AUTHZ_POLICY_FILE").ok().map(PathBuf::from);
        let audit_log = env_or("AUTHZ_AUDIT_LOG", true)?;
        Ok(Self {
            storage,
            postgres,
            rules_table,
            model_path,
            policy_file,
            audit_log,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("AUTHZ_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read AUTHZ_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply the keys present in a YAML override document.
    pub fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: AuthzConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse authorization config yaml")?;
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(url) = override_cfg.postgres_url {
            let pg = self.postgres.get_or_insert_with(|| PostgresConfig {
                url: String::new(),
                max_connections: DEFAULT_PG_MAX_CONNECTIONS,
                connect_timeout_ms: DEFAULT_PG_CONNECT_TIMEOUT_MS,
                acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
            });
            pg.url = url;
        }
        if let Some(pg) = self.postgres.as_mut() {
            if let Some(value) = override_cfg.postgres_max_connections {
                pg.max_connections = value;
            }
            if let Some(value) = override_cfg.postgres_connect_timeout_ms {
                pg.connect_timeout_ms = value;
            }
            if let Some(value) = override_cfg.postgres_acquire_timeout_ms {
                pg.acquire_timeout_ms = value;
            }
        }
        if let Some(value) = override_cfg.rules_table {
            self.rules_table = value;
        }
        if let Some(value) = override_cfg.model_path {
            self.model_path = Some(value);
        }
        if let Some(value) = override_cfg.policy_file {
            self.policy_file = Some(value);
        }
        if let Some(value) = override_cfg.audit_log {
            self.audit_log = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("AUTHZ_POSTGRES_URL is required when AUTHZ_STORAGE=postgres");
        }
        Ok(())
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}
