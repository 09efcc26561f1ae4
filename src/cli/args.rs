//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_FILE;
use crate::profile::Profile;

/// Asset bundling pipeline CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file name, searched upward from the current directory
    #[arg(short = 'C', long, global = true, default_value = CONFIG_FILE, value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build every bundle once
    #[command(visible_alias = "b")]
    Build {
        #[command(flatten)]
        profile: ProfileArgs,

        /// Rebuild even if inputs are unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Build, then rebuild on every change until Ctrl+C
    #[command(visible_alias = "w")]
    Watch {
        #[command(flatten)]
        profile: ProfileArgs,
    },

    /// Print bundle URLs as JSON (never builds)
    #[command(visible_alias = "u")]
    Urls {
        #[command(flatten)]
        profile: ProfileArgs,

        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Print the files a watcher would observe, one per line
    Files {
        /// Print raw glob patterns instead of resolved files
        #[arg(short, long)]
        globs: bool,
    },
}

/// Profile selection shared by the build-related commands.
#[derive(clap::Args, Debug, Clone, Copy)]
pub struct ProfileArgs {
    /// Use the production profile (minify, version outputs, cache, manifest)
    #[arg(short = 'z', long)]
    pub production: bool,
}

impl ProfileArgs {
    pub const fn profile(self) -> Profile {
        Profile::from_production(self.production)
    }
}
