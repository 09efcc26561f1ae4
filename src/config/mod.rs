//! Configuration management for `tola-assets.toml` and `assets.yml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── bundles   # assets.yml bundle definitions
//! ├── error     # ConfigError, ConfigDiagnostics
//! ├── util      # config lookup, assets dir discovery
//! └── mod.rs    # AssetsConfig (this file)
//! ```
//!
//! # Sections
//!
//! | Section            | Purpose                                          |
//! |--------------------|--------------------------------------------------|
//! | `[assets]`         | Bundle file, asset root, URL prefix, manifest    |
//! | `[watch]`          | Debounce and cooldown of the file watcher        |
//! | `[filters.<name>]` | External command filters (stdin -> stdout)       |
//!
//! # Example
//!
//! ```toml
//! [assets]
//! bundles = "assets.yml"
//! url = "/static"
//!
//! [watch]
//! debounce_ms = 200
//!
//! [filters.sass]
//! command = ["sass", "--stdin", "--no-source-map"]
//! ```

mod bundles;
mod error;
mod util;

pub use bundles::load_bundles;
pub use error::{ConfigDiagnostic, ConfigDiagnostics, ConfigError, FieldPath};
pub use util::{ASSETS_DIR_NAME, discover_assets_dir, find_config_file};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::log;

/// Default config file name, searched upward from the working directory.
pub const CONFIG_FILE: &str = "tola-assets.toml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing `tola-assets.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Bundle sources and output settings
    #[serde(default)]
    pub assets: AssetsSection,

    /// File watcher settings
    #[serde(default)]
    pub watch: WatchSection,

    /// External command filters by name
    #[serde(default)]
    pub filters: BTreeMap<String, CommandFilterConfig>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            root: PathBuf::new(),
            assets: AssetsSection::default(),
            watch: WatchSection::default(),
            filters: BTreeMap::new(),
        }
    }
}

/// `[assets]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetsSection {
    /// Bundle definitions file, relative to the project root.
    pub bundles: PathBuf,

    /// Explicit asset root. When unset, the shallowest directory named
    /// `assets` under the project root is used.
    pub directory: Option<PathBuf>,

    /// URL prefix under which the asset root is served.
    pub url: String,

    /// Manifest file name, relative to the asset root.
    pub manifest: PathBuf,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            bundles: PathBuf::from("assets.yml"),
            directory: None,
            url: "/assets".to_string(),
            manifest: PathBuf::from(".assets-manifest.json"),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSection {
    /// Quiet period after the last event before a rebuild starts.
    pub debounce_ms: u64,

    /// Minimum time between two rebuilds.
    pub cooldown_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            cooldown_ms: 800,
        }
    }
}

impl WatchSection {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// `[filters.<name>]` external command filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFilterConfig {
    /// Program and arguments. Content is piped to stdin, result read from stdout.
    pub command: Vec<String>,
}

impl AssetsConfig {
    /// Load configuration, searching upward from `start` for `config_name`.
    ///
    /// Without a config file, defaults apply and `start` is the project root.
    pub fn load(config_name: &Path, start: &Path) -> Result<Self, ConfigError> {
        let mut config = match find_config_file(config_name, start) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.root = path.parent().map(Path::to_path_buf).unwrap_or_default();
                config.config_path = path;
                config
            }
            None => {
                crate::debug!("config"; "{} not found, using defaults", config_name.display());
                Self {
                    root: start.to_path_buf(),
                    ..Self::default()
                }
            }
        };

        config.root = crate::utils::path::normalize_path(&config.root);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file path, warning about unknown fields.
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring: {}", display_path, fields.join(", "));
    }

    /// Collect every problem in the tool configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        for (name, filter) in &self.filters {
            let field = FieldPath::new(format!("filters.{name}.command"));
            match filter.command.first() {
                None => diag.error(field, "command is empty"),
                Some(program) if which::which(program).is_err() => diag.error_with_hint(
                    field,
                    format!("`{program}` not found"),
                    "install it or use an absolute path",
                ),
                Some(_) => {}
            }
        }

        Ok(diag.into_result()?)
    }

    /// Absolute path of the bundle definitions file.
    pub fn bundles_path(&self) -> PathBuf {
        util::expand_path(&self.assets.bundles, &self.root)
    }

    /// The asset root: the configured directory, or the discovered `assets` dir.
    ///
    /// `None` means the Environment will be inert.
    pub fn asset_directory(&self) -> Option<PathBuf> {
        match &self.assets.directory {
            Some(dir) => {
                let dir = util::expand_path(dir, &self.root);
                dir.is_dir().then(|| crate::utils::path::normalize_path(&dir))
            }
            None => discover_assets_dir(&self.root).map(|d| crate::utils::path::normalize_path(&d)),
        }
    }
}

// ============================================================================
// tests
// ============================================================================
