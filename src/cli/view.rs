use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use warden_authz::build_redacted_view;
use warden_config::EnforcementConfig;
use warden_core_types::{AuthorizationContext, AuthorizationContextKind, ResourceType};

use super::runtime::{load_enforcer, read_json};

#[derive(Args, Clone, Debug)]
pub struct ViewArgs {
    /// Policy JSON file
    #[arg(long, value_name = "FILE")]
    pub policy: PathBuf,

    /// Subject ids of the reader
    #[arg(long = "subject", required = true)]
    pub subjects: Vec<String>,

    /// Entity JSON file
    #[arg(long, value_name = "FILE")]
    pub entity: PathBuf,

    /// Type of the entity (thing or policy)
    #[arg(long = "type", default_value = "thing")]
    pub resource_type: String,
}

pub async fn cmd_view(args: ViewArgs, config: &EnforcementConfig) -> Result<()> {
    let enforcer = load_enforcer(&args.policy).await?;
    let entity = read_json(&args.entity).await?;
    let resource_type: ResourceType = args
        .resource_type
        .parse()
        .with_context(|| format!("Unknown entity type '{}'", args.resource_type))?;
    let context = AuthorizationContext::new(AuthorizationContextKind::PreAuthenticated, args.subjects);
    let always_visible: &[String] = match resource_type {
        ResourceType::Thing => config.dispatcher.always_visible_fields.as_slice(),
        _ => &[],
    };
    let view = build_redacted_view(&enforcer, resource_type, &entity, &context, always_visible);
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
