use std::path::Path;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_authz::{Policy, PolicyEnforcer};
use warden_config::{load_config, EnforcementConfig};

pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}

pub fn load_effective_config(path: Option<&Path>) -> Result<EnforcementConfig> {
    load_config(path).context("Failed to load configuration")
}

pub async fn read_json(path: &Path) -> Result<serde_json::Value> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

pub async fn load_enforcer(path: &Path) -> Result<PolicyEnforcer> {
    let document = read_json(path).await?;
    let policy = Policy::from_json(&document)
        .with_context(|| format!("{} is not a valid policy", path.display()))?;
    Ok(PolicyEnforcer::new(policy))
}
