use clap::Subcommand;

use super::check::CheckArgs;
use super::config::ConfigArgs;
use super::view::ViewArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Evaluate a policy file for a set of subjects
    Check(CheckArgs),

    /// Print the part of an entity a set of subjects may read
    View(ViewArgs),

    /// Show the effective configuration and where each value came from
    Config(ConfigArgs),
}
