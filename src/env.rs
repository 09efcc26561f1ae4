//! Environment: the composition root of the asset pipeline.
//!
//! Owns the bundle store, the profile settings, the build engine (with its
//! manifest) and the build gate. Every build, whether requested directly or
//! triggered by the watcher, runs through [`BuildGate`], so at most one build
//! pass is in flight per Environment.
//!
//! Without an asset directory the Environment is inert: builds are no-ops
//! and URL or watch queries return empty results.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::build::{BuildEngine, BuildError, BuildReport, BuildResult};
use crate::bundle::{Bundle, BundleStore, resolve_contents, resolve_depends};
use crate::config::{AssetsConfig, ConfigError, load_bundles};
use crate::filter::FilterRegistry;
use crate::log;
use crate::manifest::Manifest;
use crate::profile::{Profile, Settings};

/// Construction parameters that do not come from bundle definitions.
#[derive(Debug, Clone)]
pub struct EnvironmentOptions {
    /// Asset root. `None` makes the Environment inert.
    pub directory: Option<PathBuf>,
    pub profile: Profile,
    /// URL prefix the asset root is served under.
    pub url_prefix: String,
    /// Manifest file, relative to the asset root.
    pub manifest_file: PathBuf,
    pub filters: FilterRegistry,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            directory: None,
            profile: Profile::Development,
            url_prefix: "/assets".to_string(),
            manifest_file: PathBuf::from(".assets-manifest.json"),
            filters: FilterRegistry::with_builtins(),
        }
    }
}

/// Active configuration plus registered bundles.
#[derive(Debug)]
pub struct Environment {
    profile: Profile,
    settings: Settings,
    bundles: BundleStore,
    engine: Option<BuildEngine>,
    manifest_path: Option<PathBuf>,
    url_prefix: String,
    gate: BuildGate,
}

impl Environment {
    /// Validate `bundles` and assemble an Environment.
    ///
    /// Configuration problems are fatal: every one of them is reported and no
    /// Environment is created.
    pub fn new(bundles: Vec<Bundle>, options: EnvironmentOptions) -> Result<Self, ConfigError> {
        // Validate the definitions as written, before outputs are versioned
        let (bundles, settings) =
            BundleStore::new(bundles, &options.filters)?.configure(options.profile);

        // A directory that does not exist at construction makes the Environment inert
        let directory = options.directory.filter(|dir| dir.is_dir());

        let manifest_path = directory
            .as_ref()
            .filter(|_| settings.manifest_enabled)
            .map(|dir| crate::utils::path::resolve_path(&options.manifest_file, dir));

        let engine = directory.map(|directory| {
            let manifest = manifest_path
                .as_deref()
                .map_or_else(Manifest::new, Manifest::load);
            BuildEngine::new(
                directory,
                options.url_prefix.clone(),
                settings,
                options.filters,
                manifest,
            )
        });

        if engine.is_none() {
            log!("assets"; "no asset directory found, nothing will be built");
        }

        Ok(Self {
            profile: options.profile,
            settings,
            bundles,
            engine,
            manifest_path,
            url_prefix: options.url_prefix,
            gate: BuildGate::default(),
        })
    }

    /// Assemble an Environment from the tool configuration and `assets.yml`.
    pub fn from_config(config: &AssetsConfig, profile: Profile) -> Result<Self, ConfigError> {
        let bundles = load_bundles(&config.bundles_path())?;
        let options = EnvironmentOptions {
            directory: config.asset_directory(),
            profile,
            url_prefix: config.assets.url.clone(),
            manifest_file: config.assets.manifest.clone(),
            filters: FilterRegistry::from_config(&config.filters),
        };
        Self::new(bundles, options)
    }

    // ------------------------------------------------------------------------
    // accessors
    // ------------------------------------------------------------------------

    /// The asset root, unless inert.
    pub fn directory(&self) -> Option<&Path> {
        self.engine.as_ref().map(BuildEngine::directory)
    }

    pub fn is_inert(&self) -> bool {
        self.engine.is_none()
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bundles(&self) -> &BundleStore {
        &self.bundles
    }

    pub fn url_prefix(&self) -> &str {
        &self.url_prefix
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.engine.as_ref().map(BuildEngine::manifest)
    }

    /// Where the manifest is persisted, when persistence is enabled.
    pub fn manifest_path(&self) -> Option<&Path> {
        self.manifest_path.as_deref()
    }

    pub fn stats(&self) -> GateStats {
        self.gate.stats()
    }

    // ------------------------------------------------------------------------
    // builds
    // ------------------------------------------------------------------------

    /// Build every registered bundle, in registration order.
    ///
    /// Per-bundle failures are logged and reported, never raised.
    pub fn build_environment(&self, force: bool) -> BuildReport {
        let Some(engine) = &self.engine else {
            return BuildReport::new();
        };

        self.gate.run(|| {
            let mut report = BuildReport::new();
            for bundle in &self.bundles {
                let result = engine.build(bundle, force);
                if let Err(e) = &result {
                    log!("error"; "{}", e.detail());
                }
                report.push(bundle.name.clone(), result);
            }

            if report.manifest_updated() {
                self.persist_manifest(engine);
            }
            report
        })
    }

    /// Build one registered bundle under the same gate.
    pub fn build_bundle(&self, name: &str, force: bool) -> Result<BuildResult, BuildError> {
        let bundle = self
            .bundles
            .get(name)
            .ok_or_else(|| BuildError::UnknownBundle(name.to_string()))?;
        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| BuildError::Inert(name.to_string()))?;

        self.gate.run(|| {
            let result = engine.build(bundle, force)?;
            if result.manifest_updated {
                self.persist_manifest(engine);
            }
            Ok(result)
        })
    }

    fn persist_manifest(&self, engine: &BuildEngine) {
        let Some(path) = &self.manifest_path else {
            return;
        };
        if let Err(e) = engine.manifest().save(path) {
            log!("error"; "cannot write manifest {}: {}", path.display(), e);
        }
    }

    // ------------------------------------------------------------------------
    // queries (never build)
    // ------------------------------------------------------------------------

    /// URLs per bundle for the template renderer.
    ///
    /// - `debug_merge`: one URL per resolved content member, in declared order
    /// - `manifest_enabled`: the manifest URL without its query string;
    ///   bundles that were never built are omitted
    /// - otherwise: the single output URL
    pub fn asset_urls(&self) -> BTreeMap<String, Vec<String>> {
        let Some(engine) = &self.engine else {
            return BTreeMap::new();
        };

        let mut urls = BTreeMap::new();
        for bundle in &self.bundles {
            let bundle_urls = if self.settings.debug_merge {
                match resolve_contents(&bundle.contents, engine.directory()) {
                    Ok(files) => files.iter().map(|f| engine.member_url(f)).collect(),
                    Err(e) => {
                        crate::debug!("urls"; "skipping {}: {}", bundle.name, e);
                        continue;
                    }
                }
            } else if self.settings.manifest_enabled {
                match engine.manifest().get(&bundle.name) {
                    Some(entry) => vec![entry.url_path().to_string()],
                    None => continue,
                }
            } else {
                vec![engine.plain_output_url(bundle)]
            };
            urls.insert(bundle.name.clone(), bundle_urls);
        }
        urls
    }

    /// Every file currently matched by any bundle's contents or depends.
    ///
    /// Recomputed on each call, since globs may match new files.
    pub fn files_to_watch(&self) -> BTreeSet<PathBuf> {
        let Some(directory) = self.directory() else {
            return BTreeSet::new();
        };

        self.bundles
            .iter()
            .flat_map(|b| {
                let mut files = resolve_depends(&b.contents, directory);
                files.extend(resolve_depends(&b.depends, directory));
                files
            })
            .collect()
    }

    /// Raw patterns of all bundles, contents before depends, de-duplicated.
    pub fn globs_to_watch(&self) -> Vec<String> {
        if self.is_inert() {
            return Vec::new();
        }

        let mut seen = FxHashSet::default();
        let contents = self.bundles.iter().flat_map(|b| &b.contents);
        let depends = self.bundles.iter().flat_map(|b| &b.depends);
        contents
            .chain(depends)
            .filter(|p| seen.insert(p.as_str()))
            .cloned()
            .collect()
    }

    /// Directories the watcher must observe: the asset root, plus the static
    /// prefix of absolute patterns that point outside it.
    pub fn watch_roots(&self) -> Vec<PathBuf> {
        let Some(directory) = self.directory() else {
            return Vec::new();
        };

        let mut roots = vec![directory.to_path_buf()];
        for pattern in self.globs_to_watch() {
            if !Path::new(&pattern).is_absolute() {
                continue;
            }
            let root = static_prefix(&pattern);
            if root.is_dir() && !roots.iter().any(|r| root.starts_with(r)) {
                roots.retain(|r| !r.starts_with(&root));
                roots.push(root);
            }
        }
        roots
    }
}

/// The directory part of an absolute pattern before its first glob component.
fn static_prefix(pattern: &str) -> PathBuf {
    let path = Path::new(pattern);
    let mut prefix = PathBuf::new();
    for component in path.components() {
        if component.as_os_str().to_string_lossy().contains(['*', '?', '[']) {
            return prefix;
        }
        prefix.push(component);
    }
    // A literal file: watch its directory.
    prefix.parent().map(Path::to_path_buf).unwrap_or(prefix)
}

// ============================================================================
// BuildGate
// ============================================================================

/// Counters exposed by the build gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GateStats {
    /// Build passes run so far.
    pub passes: usize,
    /// Passes currently executing.
    pub in_flight: usize,
    /// Highest `in_flight` ever observed.
    pub max_in_flight: usize,
}

/// Serializes builds of one Environment.
#[derive(Debug, Default)]
pub struct BuildGate {
    lock: Mutex<()>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    passes: AtomicUsize,
}

impl BuildGate {
    /// Run `f` while holding the gate. Blocks until the gate is free.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.lock.lock();
        let _flight = InFlight::enter(self);
        f()
    }

    pub fn stats(&self) -> GateStats {
        GateStats {
            passes: self.passes.load(Ordering::SeqCst),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            max_in_flight: self.max_in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Entry/exit bookkeeping for one pass, released on unwind too.
struct InFlight<'a>(&'a BuildGate);

impl<'a> InFlight<'a> {
    fn enter(gate: &'a BuildGate) -> Self {
        let now = gate.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        gate.max_in_flight.fetch_max(now, Ordering::SeqCst);
        gate.passes.fetch_add(1, Ordering::SeqCst);
        Self(gate)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuildStatus;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let assets = dir.path().join("assets");
        fs::create_dir_all(assets.join("css")).unwrap();
        fs::create_dir_all(assets.join("js")).unwrap();
        fs::create_dir_all(assets.join("scss")).unwrap();
        fs::write(assets.join("css/a.css"), "a { color: red; }").unwrap();
        fs::write(assets.join("css/b.css"), "b { color: blue; }").unwrap();
        fs::write(assets.join("scss/_vars.scss"), "$x: 1;").unwrap();
        fs::write(assets.join("js/app.js"), "var app = 1;").unwrap();
        dir
    }

    fn bundles() -> Vec<Bundle> {
        vec![
            Bundle::new("app_css", "gen/app.css")
                .with_contents(["css/a.css", "css/b.css"])
                .with_depends(["scss/*.scss"])
                .with_filters(["cssmin"]),
            Bundle::new("app_js", "gen/app.js")
                .with_contents(["js/*.js"])
                .with_filters(["jsmin"]),
        ]
    }

    fn env(dir: &TempDir, profile: Profile, bundles: Vec<Bundle>) -> Environment {
        let options = EnvironmentOptions {
            directory: Some(dir.path().join("assets")),
            profile,
            ..EnvironmentOptions::default()
        };
        Environment::new(bundles, options).unwrap()
    }

    #[test]
    fn test_construction_rejects_bad_config() {
        let dup = vec![
            Bundle::new("a", "x.css").with_contents(["css/a.css"]),
            Bundle::new("a", "y.css").with_contents(["css/b.css"]),
            Bundle::new("b", "z.css").with_contents(["css/b.css"]).with_filters(["sass"]),
        ];
        let err = Environment::new(dup, EnvironmentOptions::default()).unwrap_err();
        let ConfigError::Diagnostics(diag) = err else {
            panic!("expected diagnostics");
        };
        assert_eq!(diag.len(), 2);
    }

    #[test]
    fn test_inert_environment() {
        let env = Environment::new(bundles(), EnvironmentOptions::default()).unwrap();

        assert!(env.is_inert());
        assert!(env.build_environment(true).is_empty());
        assert!(env.asset_urls().is_empty());
        assert!(env.files_to_watch().is_empty());
        assert!(env.globs_to_watch().is_empty());
        assert!(env.watch_roots().is_empty());
        assert_eq!(env.stats().passes, 0);
        assert!(matches!(
            env.build_bundle("app_css", false),
            Err(BuildError::Inert(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_inert() {
        let dir = TempDir::new().unwrap();
        let options = EnvironmentOptions {
            directory: Some(dir.path().join("assets")),
            profile: Profile::Production,
            ..EnvironmentOptions::default()
        };
        let env = Environment::new(bundles(), options).unwrap();

        assert!(env.is_inert());
        assert!(env.manifest_path().is_none());
        assert!(env.build_environment(false).is_empty());
        assert!(env.files_to_watch().is_empty());
        assert!(!dir.path().join("assets").exists());
    }

    #[test]
    fn test_production_rejects_empty_output() {
        let dir = fixture();
        let options = EnvironmentOptions {
            directory: Some(dir.path().join("assets")),
            profile: Profile::Production,
            ..EnvironmentOptions::default()
        };
        let blank = vec![Bundle::new("app", "").with_contents(["css/a.css"])];
        let err = Environment::new(blank, options).unwrap_err();
        let ConfigError::Diagnostics(diag) = err else {
            panic!("expected diagnostics");
        };
        assert_eq!(diag.len(), 1);
    }

    #[test]
    fn test_unwritable_output_is_scoped_to_its_bundle() {
        let dir = fixture();
        let assets = dir.path().join("assets");
        let bundles = vec![
            Bundle::new("app_css", "css_out/app.css").with_contents(["css/*.css"]),
            Bundle::new("app_js", "gen/app.js").with_contents(["js/*.js"]),
        ];
        let env = env(&dir, Profile::Production, bundles);
        assert!(env.build_environment(false).is_success());

        let before = env.manifest().unwrap().get("app_css").unwrap();
        let persisted = fs::read_to_string(env.manifest_path().unwrap()).unwrap();

        // A plain file where the output directory should be
        fs::remove_dir_all(assets.join("css_out")).unwrap();
        fs::write(assets.join("css_out"), "not a directory").unwrap();

        let report = env.build_environment(true);
        assert!(matches!(
            report.get("app_css"),
            Some(Err(BuildError::Io { .. }))
        ));
        let Some(Ok(js)) = report.get("app_js") else {
            panic!("app_js should build");
        };
        assert_eq!(js.status, BuildStatus::Built);

        assert_eq!(env.manifest().unwrap().get("app_css").unwrap(), before);
        assert_eq!(
            fs::read_to_string(env.manifest_path().unwrap()).unwrap(),
            persisted
        );
    }

    #[test]
    fn test_development_urls_are_members() {
        let dir = fixture();
        let env = env(&dir, Profile::Development, bundles());

        let urls = env.asset_urls();
        assert_eq!(urls["app_css"], ["/assets/css/a.css", "/assets/css/b.css"]);
        assert_eq!(urls["app_js"], ["/assets/js/app.js"]);
        // no build as a side effect
        assert_eq!(env.stats().passes, 0);
        assert!(!dir.path().join("assets/gen").exists());
    }

    #[test]
    fn test_production_urls_follow_manifest() {
        let dir = fixture();
        let env = env(&dir, Profile::Production, bundles());

        assert!(env.asset_urls().is_empty());

        let report = env.build_environment(false);
        assert!(report.is_success());

        let urls = env.asset_urls();
        let version = env.manifest().unwrap().get("app_css").unwrap().version;
        assert_eq!(urls["app_css"], [format!("/assets/gen/app.{version}.css")]);

        fs::write(dir.path().join("assets/css/a.css"), "a { color: green; }").unwrap();
        env.build_environment(false);
        let changed = env.asset_urls();
        assert_ne!(changed["app_css"], urls["app_css"]);
        assert_eq!(changed["app_js"], urls["app_js"]);
    }

    #[test]
    fn test_manifest_persisted_and_restored() {
        let dir = fixture();
        let first = env(&dir, Profile::Production, bundles());
        first.build_environment(false);

        let path = first.manifest_path().unwrap().to_path_buf();
        assert_eq!(path, dir.path().join("assets/.assets-manifest.json"));
        assert!(path.is_file());

        let second = env(&dir, Profile::Production, bundles());
        assert_eq!(second.asset_urls(), first.asset_urls());
    }

    #[test]
    fn test_development_has_no_manifest_file() {
        let dir = fixture();
        let env = env(&dir, Profile::Development, bundles());
        env.build_environment(true);
        assert!(env.manifest_path().is_none());
        assert!(!dir.path().join("assets/.assets-manifest.json").exists());
    }

    #[test]
    fn test_sibling_failure_does_not_stop_pass() {
        let dir = fixture();
        let mut defs = bundles();
        defs.insert(
            0,
            Bundle::new("broken", "gen/broken.js").with_contents(["js/*.coffee"]),
        );
        let env = env(&dir, Profile::Production, defs);

        let report = env.build_environment(false);
        assert_eq!(report.len(), 3);
        assert_eq!(report.failed().count(), 1);
        assert!(matches!(
            report.get("broken"),
            Some(Err(BuildError::Resolution { .. }))
        ));
        assert_eq!(report.built().count(), 2);
        assert!(!env.asset_urls().contains_key("broken"));
    }

    #[test]
    fn test_second_pass_is_fresh() {
        let dir = fixture();
        let env = env(&dir, Profile::Production, bundles());

        env.build_environment(false);
        let manifest = env.manifest().unwrap().snapshot();
        let report = env.build_environment(false);

        assert_eq!(report.fresh().count(), 2);
        assert_eq!(env.manifest().unwrap().snapshot(), manifest);

        let forced = env.build_environment(true);
        assert_eq!(forced.built().count(), 2);
        assert_eq!(env.stats().passes, 3);
    }

    #[test]
    fn test_dependency_change_invalidates() {
        let dir = fixture();
        let env = env(&dir, Profile::Production, bundles());
        env.build_environment(false);

        fs::write(dir.path().join("assets/scss/_vars.scss"), "$x: 2;").unwrap();
        let report = env.build_environment(false);
        let status = |name| report.get(name).unwrap().as_ref().unwrap().status;
        assert_eq!(status("app_css"), BuildStatus::Built);
        assert_eq!(status("app_js"), BuildStatus::Fresh);
    }

    #[test]
    fn test_build_bundle() {
        let dir = fixture();
        let env = env(&dir, Profile::Development, bundles());

        let result = env.build_bundle("app_js", false).unwrap();
        assert_eq!(result.output, dir.path().join("assets/gen/app.js"));
        assert!(matches!(
            env.build_bundle("nope", false),
            Err(BuildError::UnknownBundle(_))
        ));
    }

    #[test]
    fn test_watch_queries() {
        let dir = fixture();
        let env = env(&dir, Profile::Development, bundles());
        let assets = dir.path().join("assets");

        let files = env.files_to_watch();
        assert!(files.contains(&assets.join("css/a.css")));
        assert!(files.contains(&assets.join("scss/_vars.scss")));
        assert!(files.contains(&assets.join("js/app.js")));
        assert_eq!(files.len(), 4);

        assert_eq!(
            env.globs_to_watch(),
            ["css/a.css", "css/b.css", "js/*.js", "scss/*.scss"]
        );
        assert_eq!(env.watch_roots(), [assets]);
    }

    #[test]
    fn test_watch_roots_include_absolute_patterns() {
        let dir = fixture();
        let vendor = dir.path().join("vendor");
        fs::create_dir_all(&vendor).unwrap();
        fs::write(vendor.join("lib.js"), "1").unwrap();

        let pattern = format!("{}/*.js", vendor.display());
        let defs = vec![Bundle::new("v", "gen/v.js").with_contents([pattern])];
        let env = env(&dir, Profile::Development, defs);

        assert_eq!(env.watch_roots(), [dir.path().join("assets"), vendor]);
    }

    #[test]
    fn test_gate_serializes_concurrent_builds() {
        let dir = fixture();
        let env = Arc::new(env(&dir, Profile::Development, bundles()));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let env = Arc::clone(&env);
                std::thread::spawn(move || env.build_environment(true))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap().is_success());
        }

        let stats = env.stats();
        assert_eq!(stats.passes, 4);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.max_in_flight, 1);
    }

    #[test]
    fn test_static_prefix() {
        assert_eq!(static_prefix("/srv/vendor/**/*.js"), PathBuf::from("/srv/vendor"));
        assert_eq!(static_prefix("/srv/vendor/lib.js"), PathBuf::from("/srv/vendor"));
    }
}
