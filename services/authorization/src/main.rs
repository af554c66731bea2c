//! Authorization service entry point.
//!
//! # Purpose
//! Loads configuration, builds the rule store and model, seeds the optional
//! policy file, and reports what was loaded. Exits non-zero when any of that
//! fails so a deployment can gate on it.
use anyhow::Context;
use authorization::audit::AuditLogger;
use authorization::config::AuthzConfig;
use authorization::observability;
use authorization::service::AuthorizationService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_observability("authorization");
    let result = run().await;
    observability::shutdown_observability();
    result
}

async fn run() -> anyhow::Result<()> {
    let config = AuthzConfig::from_env_or_yaml().context("authorization config")?;
    let service = build_service(&config).await?;
    tracing::info!(
        backend = service.backend_name(),
        durable = service.is_durable(),
        policies = service.policies()?.len(),
        groupings = service.groupings()?.len(),
        "authorization service ready"
    );
    Ok(())
}

async fn build_service(config: &AuthzConfig) -> anyhow::Result<AuthorizationService> {
    let service = AuthorizationService::from_config(config, AuditLogger::new(config.audit_log))
        .await
        .context("build authorization service")?;
    if let Some(path) = &config.policy_file {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read policy file {}", path.display()))?;
        service
            .add_policy_from_csv(&content)
            .await
            .with_context(|| format!("load policy file {}", path.display()))?;
        tracing::info!(path = %path.display(), "policy file loaded");
    }
    Ok(service)
}
