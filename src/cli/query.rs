//! `urls` and `files` commands: read-only views for external collaborators.

use std::io::{self, Write};

use anyhow::Result;

use crate::config::AssetsConfig;
use crate::env::Environment;
use crate::profile::Profile;

/// Print `asset_urls()` as a JSON object.
pub fn print_urls(config: &AssetsConfig, profile: Profile, pretty: bool) -> Result<()> {
    let env = Environment::from_config(config, profile)?;
    let urls = env.asset_urls();

    let json = if pretty {
        serde_json::to_string_pretty(&urls)?
    } else {
        serde_json::to_string(&urls)?
    };

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    Ok(())
}

/// Print the watch set (or the raw globs), one entry per line.
pub fn print_files(config: &AssetsConfig, globs: bool) -> Result<()> {
    let env = Environment::from_config(config, Profile::Development)?;

    let lines: Vec<String> = if globs {
        env.globs_to_watch()
    } else {
        env.files_to_watch()
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    };

    let mut stdout = io::stdout().lock();
    for line in lines {
        writeln!(stdout, "{line}")?;
    }
    Ok(())
}
