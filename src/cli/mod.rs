//! Command-line interface module.

mod args;
pub mod build;
pub mod query;

pub use args::{Cli, Commands, ProfileArgs};

use anyhow::Result;

use crate::config::AssetsConfig;

/// Dispatch a parsed command.
pub fn run(cli: &Cli, config: &AssetsConfig) -> Result<()> {
    match &cli.command {
        Commands::Build { profile, force } => {
            build::build_assets(config, profile.profile(), *force)
        }
        Commands::Watch { profile } => build::watch_assets(config, profile.profile()),
        Commands::Urls { profile, pretty } => {
            query::print_urls(config, profile.profile(), *pretty)
        }
        Commands::Files { globs } => query::print_files(config, *globs),
    }
}
