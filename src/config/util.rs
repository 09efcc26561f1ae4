//! Configuration utility functions.

use jwalk::WalkDir;
use std::path::{Path, PathBuf};

/// Name of the directory that holds bundle sources.
pub const ASSETS_DIR_NAME: &str = "assets";

/// Find config file by searching upward from `start`
///
/// Walks up parent directories until finding `config_name`.
/// Returns the absolute path to the config file if found
///
/// # Example
/// ```text
/// /home/user/site/assets/css/   ← start
/// /home/user/site/tola-assets.toml  ← found!
/// ```
pub fn find_config_file(config_name: &Path, start: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let mut current = start;
    loop {
        let candidate = current.join(config_name);
        if candidate.is_file() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// Locate the asset root: the shallowest directory literally named `assets`
/// below `root` (ties broken by name order).
///
/// Hidden directories are skipped. Returns `None` when no such directory exists.
pub fn discover_assets_dir(root: &Path) -> Option<PathBuf> {
    if !root.is_dir() {
        return None;
    }

    WalkDir::new(root)
        .sort(true)
        .skip_hidden(true)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_dir() && e.file_name() == ASSETS_DIR_NAME)
        .min_by_key(|e| e.depth)
        .map(|e| e.path())
}

/// Expand `~` in a configured path and resolve it against `root`.
pub fn expand_path(path: &Path, root: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    crate::utils::path::resolve_path(Path::new(&expanded), root)
}

// ============================================================================
// tests
// ============================================================================
