//! Path resolution: bundle globs to concrete absolute file paths.
//!
//! Patterns are relative to the asset root unless already absolute. `*`
//! never crosses a directory separator; `**` matches recursively. Results
//! are de-duplicated, keeping first-seen order.

use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern, PatternError};
use rustc_hash::FxHashSet;
use thiserror::Error;

use super::Bundle;

/// Glob matching rules shared by resolution and the watcher.
pub const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Why a bundle's `contents` could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("`{0}` matched no files")]
    NoMatch(String),

    #[error("invalid glob `{0}`")]
    InvalidPattern(String, #[source] PatternError),
}

impl ResolveError {
    /// The pattern that failed.
    pub fn pattern(&self) -> &str {
        match self {
            Self::NoMatch(p) | Self::InvalidPattern(p, _) => p,
        }
    }
}

/// A bundle's resolved inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Content files in declared order.
    pub contents: Vec<PathBuf>,
    /// Dependency files (may be empty).
    pub depends: Vec<PathBuf>,
}

impl Resolved {
    /// All resolved files, contents first.
    pub fn all(&self) -> impl Iterator<Item = &PathBuf> {
        self.contents.iter().chain(&self.depends)
    }
}

/// Resolve both `contents` and `depends` of a bundle.
pub fn resolve_bundle(bundle: &Bundle, directory: &Path) -> Result<Resolved, ResolveError> {
    Ok(Resolved {
        contents: resolve_contents(&bundle.contents, directory)?,
        depends: resolve_depends(&bundle.depends, directory),
    })
}

/// Resolve content patterns. Every entry must match at least one file.
pub fn resolve_contents(
    patterns: &[String],
    directory: &Path,
) -> Result<Vec<PathBuf>, ResolveError> {
    let mut seen = FxHashSet::default();
    let mut files = Vec::new();

    for pattern in patterns {
        let matched = expand(pattern, directory)
            .map_err(|e| ResolveError::InvalidPattern(pattern.clone(), e))?;
        if matched.is_empty() {
            return Err(ResolveError::NoMatch(pattern.clone()));
        }
        for path in matched {
            if seen.insert(path.clone()) {
                files.push(path);
            }
        }
    }

    Ok(files)
}

/// Resolve dependency patterns. Patterns matching nothing are allowed.
pub fn resolve_depends(patterns: &[String], directory: &Path) -> Vec<PathBuf> {
    let mut seen = FxHashSet::default();
    let mut files = Vec::new();

    for pattern in patterns {
        match expand(pattern, directory) {
            Ok(matched) => {
                for path in matched {
                    if seen.insert(path.clone()) {
                        files.push(path);
                    }
                }
            }
            Err(e) => crate::debug!("resolve"; "skipping dependency `{}`: {}", pattern, e),
        }
    }

    files
}

/// Expand one pattern into the sorted list of files it matches.
///
/// A pattern without glob metacharacters is a literal path and matches only
/// if the file exists.
pub fn expand(pattern: &str, directory: &Path) -> Result<Vec<PathBuf>, PatternError> {
    if !has_magic(pattern) {
        let path = crate::utils::path::resolve_path(Path::new(pattern), directory);
        return Ok(if path.is_file() { vec![path] } else { vec![] });
    }

    let full = compile_pattern(pattern, directory)?;
    let mut files: Vec<_> = glob::glob_with(full.as_str(), MATCH_OPTIONS)?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Compile a pattern into an absolute [`Pattern`] rooted at `directory`.
///
/// The directory part is escaped, so roots containing `[` or `*` still match
/// literally.
pub fn compile_pattern(pattern: &str, directory: &Path) -> Result<Pattern, PatternError> {
    if Path::new(pattern).is_absolute() {
        return Pattern::new(pattern);
    }
    let root = Pattern::escape(&directory.to_string_lossy());
    let root = root.trim_end_matches(['/', '\\']);
    let pattern = pattern.trim_start_matches("./");
    Pattern::new(&format!("{root}/{pattern}"))
}

fn has_magic(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}
