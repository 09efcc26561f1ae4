use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use super::WatchError;

/// Keeps the watcher attached to the directories the Environment needs.
///
/// - attach existing roots at startup
/// - re-attach roots that were removed and recreated
/// - follow the root list when it changes after a build
pub(super) struct WatchRoots {
    desired: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            desired: paths,
            attached: FxHashSet::default(),
        }
    }

    /// Attach every existing root. Fails on the first root the backend rejects.
    pub(super) fn attach_existing(
        &mut self,
        watcher: &mut RecommendedWatcher,
    ) -> Result<(), WatchError> {
        for path in &self.desired {
            if !path.exists() {
                continue;
            }
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(|e| WatchError::Unavailable(path.clone(), e))?;
            self.attached.insert(path.clone());
        }

        Ok(())
    }

    /// Replace the desired roots, detaching the ones no longer needed.
    pub(super) fn rearm(&mut self, paths: Vec<PathBuf>, watcher: &mut RecommendedWatcher) {
        if paths == self.desired {
            return;
        }

        let stale: Vec<_> = self
            .attached
            .iter()
            .filter(|p| !paths.contains(p))
            .cloned()
            .collect();
        for path in stale {
            watcher.unwatch(&path).ok();
            self.attached.remove(&path);
        }

        self.desired = paths;
        self.maintain(watcher);
    }

    pub(super) fn maintain(&mut self, watcher: &mut RecommendedWatcher) {
        // Drop stale handles for roots that no longer exist.
        self.attached.retain(|path| path.exists());

        for path in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }

            if watcher.watch(path, RecursiveMode::Recursive).is_ok() {
                self.attached.insert(path.clone());
                crate::debug!("watch"; "attached: {}", path.display());
            }
        }
    }
}
