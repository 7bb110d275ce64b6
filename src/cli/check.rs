use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use warden_authz::{Permission, Permissions};
use warden_core_types::{ResourceKey, SubjectId};

use super::runtime::load_enforcer;

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum CheckMode {
    /// Every permission holds at the resource and nothing beneath revokes it
    #[default]
    Unrestricted,
    /// Some permission holds at the resource or beneath it
    Partial,
}

#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// Policy JSON file
    #[arg(long, value_name = "FILE")]
    pub policy: PathBuf,

    /// Subject ids of the requester
    #[arg(long = "subject", required = true)]
    pub subjects: Vec<String>,

    /// Resource key, e.g. thing:/attributes/location
    #[arg(long)]
    pub resource: String,

    /// Permissions to check (READ, WRITE, EXECUTE)
    #[arg(long = "permission", required = true)]
    pub permissions: Vec<String>,

    #[arg(long, value_enum, default_value_t = CheckMode::Unrestricted)]
    pub mode: CheckMode,
}

pub async fn cmd_check(args: CheckArgs) -> Result<()> {
    let enforcer = load_enforcer(&args.policy).await?;
    let resource = ResourceKey::parse(&args.resource)
        .with_context(|| format!("Invalid resource '{}'", args.resource))?;
    let permissions = args
        .permissions
        .iter()
        .map(|raw| raw.parse::<Permission>())
        .collect::<Result<Permissions, _>>()
        .context("Invalid permission")?;
    let subjects: Vec<SubjectId> = args.subjects.iter().map(SubjectId::new).collect();

    let allowed = match args.mode {
        CheckMode::Unrestricted => {
            enforcer.has_unrestricted_permissions(&resource, &subjects, &permissions)
        }
        CheckMode::Partial => enforcer.has_partial_permissions(&resource, &subjects, &permissions),
    };
    println!("{}", if allowed { "ALLOW" } else { "DENY" });
    Ok(())
}
