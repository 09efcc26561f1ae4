//! `build` and `watch` commands.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::build::BuildReport;
use crate::config::AssetsConfig;
use crate::env::Environment;
use crate::log;
use crate::profile::Profile;
use crate::watch::{WatchCoordinator, WatchOptions};

/// Build every bundle once. Fails if any bundle failed.
pub fn build_assets(config: &AssetsConfig, profile: Profile, force: bool) -> Result<()> {
    let env = Environment::from_config(config, profile)?;
    log!("build"; "{} bundles ({})", env.bundles().len(), profile.name());

    let report = env.build_environment(force);
    finish(&report)
}

/// Initial build, then rebuild on change until Ctrl+C.
///
/// A watcher that cannot start is reported and the process exits after the
/// initial build.
pub fn watch_assets(config: &AssetsConfig, profile: Profile) -> Result<()> {
    let env = Arc::new(Environment::from_config(config, profile)?);
    let options = WatchOptions::from(config.watch);

    let (shutdown_tx, shutdown_rx) = crossbeam::channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("failed to set Ctrl+C handler")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    runtime.block_on(async move {
        // Attach the watcher before the initial build so no change is missed
        let handle = match WatchCoordinator::new(Arc::clone(&env), options).start() {
            Ok(handle) => Some(handle),
            Err(e) => {
                log!("error"; "{}", error_chain(&e));
                None
            }
        };

        let initial_env = Arc::clone(&env);
        let report = tokio::task::spawn_blocking(move || initial_env.build_environment(false))
            .await
            .context("initial build panicked")?;
        let Some(handle) = handle else {
            return finish(&report);
        };
        log!("build"; "{}", report.summary());

        log!("watch"; "watching {} files, press Ctrl+C to stop", env.files_to_watch().len());
        tokio::task::spawn_blocking(move || shutdown_rx.recv().ok())
            .await
            .ok();

        log!("watch"; "shutting down...");
        handle.shutdown().await?;
        Ok(())
    })
}

fn finish(report: &BuildReport) -> Result<()> {
    if report.is_success() {
        log!("build"; "{}", report.summary());
        return Ok(());
    }
    bail!(
        "{} of {} bundles failed",
        report.failed().count(),
        report.len()
    )
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        message.push_str(": ");
        message.push_str(&e.to_string());
        source = e.source();
    }
    message
}
