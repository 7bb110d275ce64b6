use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use super::check::cmd_check;
use super::commands::Commands;
use super::config::cmd_config;
use super::env::CliArgs;
use super::runtime::{init_logging, load_effective_config};
use super::view::cmd_view;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();
    let config = load_effective_config(cli.config.as_deref())?;
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, cli.debug, config.logging.json)?;
    debug!(rev = config.rev, "configuration loaded");

    let outcome = match cli.command {
        Commands::Check(args) => cmd_check(args).await,
        Commands::View(args) => cmd_view(args, &config).await,
        Commands::Config(args) => cmd_config(args, &config),
    };
    if let Err(err) = &outcome {
        error!("Command failed: {}", err);
    }
    outcome
}
