//! Build Engine: resolve, concatenate, filter, version and write one bundle.
//!
//! # Pipeline
//!
//! ```text
//! resolve globs ─► fresh? ──yes──► cached result
//!                    │no
//!                    ▼
//! read contents ─► join ─► filter chain ─► hash ─► write (atomic) ─► manifest
//! ```
//!
//! Freshness is only consulted when the profile enables caching and the call
//! is not forced. A forced build always rewrites the artifact.

mod error;
mod write;

pub use error::BuildError;
pub use write::write_atomic;

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::bundle::{Bundle, Resolved, resolve_bundle};
use crate::filter::{FilterContext, FilterRegistry};
use crate::freshness::{ContentHash, Fingerprint};
use crate::manifest::{Manifest, ManifestEntry};
use crate::profile::{Settings, interpolate_version};
use crate::utils::path::{join_url, resolve_path, to_url_path};

/// Separator placed between concatenated content files.
pub const JOIN_SEPARATOR: &str = "\n";

/// Whether the artifact was written by this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Built,
    Fresh,
}

/// A successfully built (or still fresh) bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    pub bundle: String,
    /// Absolute path of the artifact.
    pub output: PathBuf,
    /// Content hash token of the artifact.
    pub version: String,
    /// Public URL of the artifact; carries `?v=` when URLs expire.
    pub url: String,
    pub status: BuildStatus,
    /// The manifest entry was replaced by this build.
    pub manifest_updated: bool,
}

#[derive(Debug, Clone)]
struct CachedBuild {
    fingerprint: Fingerprint,
    result: BuildResult,
}

/// Builds bundles against one asset root with fixed settings.
#[derive(Debug)]
pub struct BuildEngine {
    directory: PathBuf,
    url_prefix: String,
    settings: Settings,
    filters: FilterRegistry,
    manifest: Manifest,
    cache: Mutex<FxHashMap<String, CachedBuild>>,
}

impl BuildEngine {
    pub fn new(
        directory: PathBuf,
        url_prefix: impl Into<String>,
        settings: Settings,
        filters: FilterRegistry,
        manifest: Manifest,
    ) -> Self {
        Self {
            directory,
            url_prefix: url_prefix.into(),
            settings,
            filters,
            manifest,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Build `bundle`, or return its cached result when nothing changed.
    pub fn build(&self, bundle: &Bundle, force: bool) -> Result<BuildResult, BuildError> {
        let resolved =
            resolve_bundle(bundle, &self.directory).map_err(|source| BuildError::Resolution {
                bundle: bundle.name.clone(),
                source,
            })?;

        // Unreadable inputs have no fingerprint, the read below reports them.
        let fingerprint = self
            .settings
            .cache_enabled
            .then(|| Fingerprint::compute(bundle, &resolved).ok())
            .flatten();

        if !force
            && let Some(fingerprint) = fingerprint
            && let Some(cached) = self.cached(&bundle.name, fingerprint)
        {
            crate::debug!("build"; "{} is fresh", bundle.name);
            return Ok(cached);
        }

        let result = self.compile(bundle, &resolved)?;

        if let Some(fingerprint) = fingerprint {
            self.cache.lock().insert(
                bundle.name.clone(),
                CachedBuild {
                    fingerprint,
                    result: result.clone(),
                },
            );
        }

        Ok(result)
    }

    /// URL of one resolved member file, for serving bundles unmerged.
    pub fn member_url(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.directory).unwrap_or(path);
        join_url(&self.url_prefix, &to_url_path(relative))
    }

    /// URL of an output template that has no version placeholder.
    pub fn plain_output_url(&self, bundle: &Bundle) -> String {
        join_url(&self.url_prefix, &to_url_path(Path::new(&bundle.output)))
    }

    fn cached(&self, name: &str, fingerprint: Fingerprint) -> Option<BuildResult> {
        let cache = self.cache.lock();
        let entry = cache.get(name)?;
        (entry.fingerprint == fingerprint && entry.result.output.is_file()).then(|| BuildResult {
            status: BuildStatus::Fresh,
            manifest_updated: false,
            ..entry.result.clone()
        })
    }

    fn compile(&self, bundle: &Bundle, resolved: &Resolved) -> Result<BuildResult, BuildError> {
        let content = self.concat(bundle, &resolved.contents)?;

        let ctx = FilterContext {
            bundle: &bundle.name,
            settings: &self.settings,
            directory: &self.directory,
        };
        let content = self
            .filters
            .apply_chain(&bundle.filters, content, &ctx)
            .map_err(|source| BuildError::Filter {
                bundle: bundle.name.clone(),
                source: source.into(),
            })?;

        let version = ContentHash::of(content.as_bytes()).version();
        let relative = interpolate_version(&bundle.output, &version);
        let output = resolve_path(Path::new(&relative), &self.directory);

        write_atomic(&output, content.as_bytes()).map_err(|source| BuildError::Io {
            bundle: bundle.name.clone(),
            path: output.clone(),
            source,
        })?;

        let mut url = self.member_url(&output);
        if self.settings.url_expire {
            url = format!("{url}?v={version}");
        }

        let manifest_updated = self.settings.manifest_enabled
            && self
                .manifest
                .set(&bundle.name, ManifestEntry::new(&version, &url));

        crate::debug!("build"; "{} -> {}", bundle.name, output.display());

        Ok(BuildResult {
            bundle: bundle.name.clone(),
            output,
            version,
            url,
            status: BuildStatus::Built,
            manifest_updated,
        })
    }

    fn concat(&self, bundle: &Bundle, files: &[PathBuf]) -> Result<String, BuildError> {
        let parts = files
            .iter()
            .map(|path| {
                fs::read_to_string(path).map_err(|source| BuildError::Io {
                    bundle: bundle.name.clone(),
                    path: path.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(JOIN_SEPARATOR))
    }
}

// ============================================================================
// BuildReport
// ============================================================================

/// Outcome of one bundle in a build pass.
#[derive(Debug)]
pub struct BundleOutcome {
    pub bundle: String,
    pub result: Result<BuildResult, BuildError>,
}

/// Per-bundle outcomes of a build pass, in registration order.
#[derive(Debug, Default)]
pub struct BuildReport {
    outcomes: Vec<BundleOutcome>,
}

impl BuildReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bundle: impl Into<String>, result: Result<BuildResult, BuildError>) {
        self.outcomes.push(BundleOutcome {
            bundle: bundle.into(),
            result,
        });
    }

    pub fn get(&self, bundle: &str) -> Option<&Result<BuildResult, BuildError>> {
        self.outcomes
            .iter()
            .find(|o| o.bundle == bundle)
            .map(|o| &o.result)
    }

    /// Bundles written by this pass.
    pub fn built(&self) -> impl Iterator<Item = &BuildResult> {
        self.successes().filter(|r| r.status == BuildStatus::Built)
    }

    /// Bundles skipped because their inputs were unchanged.
    pub fn fresh(&self) -> impl Iterator<Item = &BuildResult> {
        self.successes().filter(|r| r.status == BuildStatus::Fresh)
    }

    pub fn failed(&self) -> impl Iterator<Item = &BuildError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Whether any manifest entry was replaced.
    pub fn manifest_updated(&self) -> bool {
        self.successes().any(|r| r.manifest_updated)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// One line summary, e.g. `2 built, 1 fresh, 1 failed`.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} built", self.built().count()),
            format!("{} fresh", self.fresh().count()),
        ];
        let failed = self.failed().count();
        if failed > 0 {
            parts.push(format!("{failed} failed"));
        }
        parts.join(", ")
    }

    fn successes(&self) -> impl Iterator<Item = &BuildResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }
}
