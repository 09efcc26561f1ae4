//! Watch Coordinator
//!
//! Observes the Environment's watch set and rebuilds when a watched file
//! changes.
//!
//! Architecture:
//! ```text
//! notify ─► bridge thread ─► mpsc ─► Debouncer ─► WatchSet filter ─► build (gate)
//!                                        ▲                               │
//!                                        └──── re-arm roots + set ◄──────┘
//! ```
//!
//! The loop awaits each build before reading further events, so changes that
//! arrive mid-build pile up in the channel and are coalesced into a single
//! follow-up pass. Builds go through the Environment's gate, shared with
//! direct callers. Shutting down waits for the build in flight.

mod debouncer;
mod roots;
mod set;

#[cfg(test)]
mod tests;

pub use debouncer::ChangeKind;
pub use set::WatchSet;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::build::BuildError;
use crate::config::WatchSection;
use crate::env::Environment;
use crate::logger::WatchStatus;
use debouncer::Debouncer;
use roots::WatchRoots;

/// Why watching could not start or stopped abnormally.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("no asset directory to watch")]
    NoDirectory,

    #[error("cannot watch `{0}`")]
    Unavailable(PathBuf, #[source] notify::Error),

    #[error("file watcher unavailable")]
    Backend(#[from] notify::Error),

    #[error("watch loop failed: {0}")]
    Runtime(String),
}

/// Lifecycle of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    Idle = 0,
    Watching = 1,
    Building = 2,
}

impl WatchState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Watching,
            2 => Self::Building,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Default)]
struct SharedState(AtomicU8);

impl SharedState {
    fn get(&self) -> WatchState {
        WatchState::from_u8(self.0.load(Ordering::SeqCst))
    }

    fn set(&self, state: WatchState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Timing of the watch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period after the last event before a rebuild starts.
    pub debounce: Duration,
    /// Minimum time between the end of one rebuild and the start of the next.
    pub cooldown: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchSection::default().into()
    }
}

impl From<WatchSection> for WatchOptions {
    fn from(section: WatchSection) -> Self {
        Self {
            debounce: section.debounce(),
            cooldown: section.cooldown(),
        }
    }
}

/// Watches an Environment and rebuilds it on change.
pub struct WatchCoordinator {
    env: Arc<Environment>,
    options: WatchOptions,
}

/// The notify side of a running coordinator.
struct Backend {
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    roots: WatchRoots,
}

impl WatchCoordinator {
    pub fn new(env: Arc<Environment>, options: WatchOptions) -> Self {
        Self { env, options }
    }

    /// Attach the file watcher and spawn the watch loop on the current
    /// tokio runtime.
    ///
    /// The watcher is attached before this returns, so changes made while the
    /// caller runs its initial build are not lost.
    pub fn start(self) -> Result<WatchHandle, WatchError> {
        if self.env.is_inert() {
            return Err(WatchError::NoDirectory);
        }

        // Sync channel for notify (it doesn't support async)
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut roots = WatchRoots::new(self.env.watch_roots());
        roots.attach_existing(&mut watcher)?;

        let (async_tx, async_rx) = mpsc::channel::<notify::Event>(64);

        // Bridge thread; ends when the watcher (and with it notify_tx) is dropped
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(e) => crate::log!("watch"; "notify error: {}", e),
                }
            }
        });

        Ok(self.spawn(async_rx, Some(Backend { watcher, roots })))
    }

    fn spawn(self, events: mpsc::Receiver<notify::Event>, backend: Option<Backend>) -> WatchHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(SharedState::default());
        state.set(WatchState::Watching);

        let task = tokio::spawn(run_loop(
            self.env,
            self.options,
            events,
            backend,
            shutdown_rx,
            Arc::clone(&state),
        ));

        WatchHandle {
            shutdown: shutdown_tx,
            task,
            state,
        }
    }
}

/// Handle to a running coordinator.
pub struct WatchHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    state: Arc<SharedState>,
}

impl WatchHandle {
    pub fn state(&self) -> WatchState {
        self.state.get()
    }

    /// Stop watching. Waits for a build in flight to finish.
    pub async fn shutdown(self) -> Result<(), WatchError> {
        let _ = self.shutdown.send(true);
        let result = self
            .task
            .await
            .map_err(|e| WatchError::Runtime(e.to_string()));
        self.state.set(WatchState::Idle);
        result
    }
}

async fn run_loop(
    env: Arc<Environment>,
    options: WatchOptions,
    mut events: mpsc::Receiver<notify::Event>,
    mut backend: Option<Backend>,
    mut shutdown: watch::Receiver<bool>,
    state: Arc<SharedState>,
) {
    let mut debouncer = Debouncer::new(options.debounce, options.cooldown);
    let mut watch_set = WatchSet::capture(&env);
    let mut status = WatchStatus::new();

    crate::debug!("watch"; "watching {} files", watch_set.len());

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            event = events.recv() => match event {
                Some(event) => debouncer.add_event(&event),
                None => break, // watcher gone
            },
            _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                if let Some(backend) = &mut backend {
                    backend.roots.maintain(&mut backend.watcher);
                }

                let Some(changes) = debouncer.take_if_ready() else {
                    continue;
                };

                let relevant: Vec<_> = changes
                    .into_iter()
                    .filter(|(path, _)| watch_set.is_relevant(path))
                    .collect();
                if relevant.is_empty() {
                    continue;
                }
                for (path, kind) in &relevant {
                    crate::debug!("watch"; "{}: {}", kind.label(), path.display());
                }

                state.set(WatchState::Building);
                let build_env = Arc::clone(&env);
                let report =
                    tokio::task::spawn_blocking(move || build_env.build_environment(false)).await;
                debouncer.mark_built();
                state.set(WatchState::Watching);

                let outputs = match report {
                    Ok(report) => {
                        if !report.is_success() {
                            let failed: Vec<_> = report.failed().map(BuildError::bundle).collect();
                            let detail: Vec<_> = report.failed().map(BuildError::detail).collect();
                            let summary = format!("failed: {}", failed.join(", "));
                            status.error(&summary, &detail.join("\n"));
                        } else if report.built().next().is_some() {
                            status.success(&format!("rebuilt: {}", report.summary()));
                        } else {
                            status.unchanged(&format!("unchanged: {}", report.summary()));
                        }
                        report
                            .built()
                            .chain(report.fresh())
                            .map(|r| r.output.clone())
                            .collect::<Vec<_>>()
                    }
                    Err(e) => {
                        status.error("build task failed", &e.to_string());
                        Vec::new()
                    }
                };

                // Globs may match new files now
                watch_set = WatchSet::capture(&env).with_outputs(outputs);
                if let Some(backend) = &mut backend {
                    backend.roots.rearm(env.watch_roots(), &mut backend.watcher);
                }
            }
        }
    }

    state.set(WatchState::Idle);
    crate::debug!("watch"; "stopped");
}
