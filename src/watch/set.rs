use std::path::{Path, PathBuf};

use glob::Pattern;
use rustc_hash::FxHashSet;

use crate::bundle::{MATCH_OPTIONS, compile_pattern};
use crate::env::Environment;
use crate::profile::VERSION_PLACEHOLDER;
use crate::utils::path::resolve_path;

/// Snapshot of what the watcher reacts to.
///
/// Holds the files matched at the time of the snapshot and the compiled
/// patterns, so files created later are recognized too. Built artifacts are
/// excluded so the watcher does not react to its own writes.
#[derive(Debug, Default)]
pub struct WatchSet {
    files: FxHashSet<PathBuf>,
    patterns: Vec<Pattern>,
    outputs: FxHashSet<PathBuf>,
}

impl WatchSet {
    /// Capture the Environment's current watch set.
    pub fn capture(env: &Environment) -> Self {
        let Some(directory) = env.directory() else {
            return Self::default();
        };

        let patterns = env
            .globs_to_watch()
            .iter()
            .filter_map(|glob| compile_pattern(glob, directory).ok())
            .collect();

        // Versioned outputs are only known once built, see `with_outputs`
        let outputs = env
            .bundles()
            .iter()
            .filter(|b| !b.output.contains(VERSION_PLACEHOLDER))
            .map(|b| resolve_path(Path::new(&b.output), directory))
            .collect();

        Self {
            files: env.files_to_watch().into_iter().collect(),
            patterns,
            outputs,
        }
    }

    /// Ignore changes to these paths.
    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    pub fn is_relevant(&self, path: &Path) -> bool {
        if self.outputs.contains(path) {
            return false;
        }
        self.files.contains(path)
            || self
                .patterns
                .iter()
                .any(|p| p.matches_path_with(path, MATCH_OPTIONS))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.patterns.is_empty()
    }
}
