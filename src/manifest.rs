//! Manifest: bundle name to the version token and URL of its current artifact.
//!
//! Entries are only ever replaced whole. A failed build leaves the previous
//! entry in place. When persistence is enabled the manifest is stored as JSON
//! (`{"app_css": {"version": "1a2b3c4d", "url": "/assets/gen/app.1a2b3c4d.css?v=1a2b3c4d"}}`)
//! and rewritten atomically.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::build::write_atomic;
use crate::log;

/// One bundle's current artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub version: String,
    pub url: String,
}

impl ManifestEntry {
    pub fn new(version: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            url: url.into(),
        }
    }

    /// The URL without its query string.
    pub fn url_path(&self) -> &str {
        self.url.split_once('?').map_or(&self.url, |(path, _)| path)
    }
}

/// Thread-safe bundle name to [`ManifestEntry`] map.
#[derive(Debug, Default)]
pub struct Manifest {
    entries: RwLock<BTreeMap<String, ManifestEntry>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a persisted manifest.
    ///
    /// A missing file gives an empty manifest; an unreadable or corrupt one is
    /// reported and ignored, since every entry can be rebuilt.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Self::new(),
            Err(e) => {
                log!("warning"; "cannot read manifest {}: {}", path.display(), e);
                return Self::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(entries) => Self {
                entries: RwLock::new(entries),
            },
            Err(e) => {
                log!("warning"; "ignoring corrupt manifest {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    /// Persist all entries as pretty JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(&*self.entries.read())?;
        write_atomic(path, &json)
    }

    pub fn get(&self, name: &str) -> Option<ManifestEntry> {
        self.entries.read().get(name).cloned()
    }

    /// Replace the entry for `name`. Returns whether anything changed.
    pub fn set(&self, name: &str, entry: ManifestEntry) -> bool {
        let mut entries = self.entries.write();
        if entries.get(name) == Some(&entry) {
            return false;
        }
        entries.insert(name.to_string(), entry);
        true
    }

    /// Copy of all entries, sorted by bundle name.
    pub fn snapshot(&self) -> BTreeMap<String, ManifestEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
