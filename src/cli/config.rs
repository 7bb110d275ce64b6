use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde_json::Value as JsonValue;
use warden_config::EnforcementConfig;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show,

    /// Get one value and its source, e.g. `dispatcher.ask_timeout_ms`
    Get {
        /// Dotted configuration key
        key: String,
    },

    /// List every key with the layer that set it
    Sources,
}

pub fn cmd_config(args: ConfigArgs, config: &EnforcementConfig) -> Result<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            println!("{}", serde_yaml::to_string(config)?);
        }
        ConfigAction::Get { key } => {
            let json = serde_json::to_value(config)?;
            let Some(value) = get_json_value(&json, &key) else {
                bail!("{} not found in configuration", key);
            };
            let source = config
                .source_of(&key)
                .map(|source| format!("{source:?}"))
                .unwrap_or_else(|| "unknown".to_string());
            println!("{} = {} ({})", key, value, source);
        }
        ConfigAction::Sources => {
            for (path, source) in &config.provenance {
                println!("{path}: {source:?}");
            }
        }
    }
    Ok(())
}

fn get_json_value<'a>(value: &'a JsonValue, key: &str) -> Option<&'a JsonValue> {
    key.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| current.get(segment))
}
