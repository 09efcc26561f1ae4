//! Bundle definitions and the in-memory Bundle Definition Store.
//!
//! A [`Bundle`] names an ordered list of source globs (`contents`), extra
//! invalidation globs (`depends`), a filter chain and an output template.
//! The [`BundleStore`] keeps bundles in registration order and is read-only
//! once an [`Environment`](crate::Environment) has been built from it.

mod resolve;

pub use resolve::{
    MATCH_OPTIONS, ResolveError, Resolved, compile_pattern, expand, resolve_bundle,
    resolve_contents, resolve_depends,
};

use rustc_hash::FxHashMap;

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::filter::FilterRegistry;
use crate::profile::{Profile, Settings, configure};

/// A named unit of assets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bundle {
    /// Unique key within an Environment.
    pub name: String,
    /// Globs or relative paths, concatenated in this order.
    pub contents: Vec<String>,
    /// Globs that invalidate the output without contributing content.
    pub depends: Vec<String>,
    /// Filter names, applied in this order.
    pub filters: Vec<String>,
    /// Output path template relative to the asset root.
    pub output: String,
}

impl Bundle {
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: Vec::new(),
            depends: Vec::new(),
            filters: Vec::new(),
            output: output.into(),
        }
    }

    pub fn with_contents<I, S>(mut self, contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contents = contents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// Check this definition, recording every problem in `diag`.
    fn validate(&self, filters: &FilterRegistry, diag: &mut ConfigDiagnostics) {
        if self.name.trim().is_empty() {
            diag.error(FieldPath::new("bundles"), "bundle name is empty");
        }

        if self.contents.is_empty() {
            diag.error(
                FieldPath::bundle(&self.name, "contents"),
                "contents list is empty",
            );
        }

        if self.output.trim().is_empty() {
            diag.error(
                FieldPath::bundle(&self.name, "output"),
                "output template is empty",
            );
        }

        for (field, patterns) in [("contents", &self.contents), ("depends", &self.depends)] {
            for pattern in patterns {
                if let Err(e) = glob::Pattern::new(pattern) {
                    diag.error(
                        FieldPath::bundle(&self.name, field),
                        format!("invalid glob `{pattern}`: {e}"),
                    );
                }
            }
        }

        for filter in &self.filters {
            if !filters.contains(filter) {
                diag.error_with_hint(
                    FieldPath::bundle(&self.name, "filters"),
                    format!("unknown filter `{filter}`"),
                    format!(
                        "available: {}; external filters go under [filters.{filter}]",
                        filters.names().join(", ")
                    ),
                );
            }
        }
    }
}

/// Registered bundles, in registration order.
#[derive(Debug, Clone, Default)]
pub struct BundleStore {
    bundles: Vec<Bundle>,
    index: FxHashMap<String, usize>,
}

impl BundleStore {
    /// Validate and register `bundles`.
    ///
    /// All problems (duplicate names, empty contents or output, invalid globs,
    /// unknown filters) are collected and returned together.
    pub fn new(bundles: Vec<Bundle>, filters: &FilterRegistry) -> Result<Self, ConfigDiagnostics> {
        let mut diag = ConfigDiagnostics::new();
        let mut store = Self::default();

        for bundle in bundles {
            bundle.validate(filters, &mut diag);
            if store.index.contains_key(&bundle.name) {
                diag.error(
                    FieldPath::bundle(&bundle.name, "name"),
                    format!("duplicate bundle name `{}`", bundle.name),
                );
                continue;
            }
            store.index.insert(bundle.name.clone(), store.bundles.len());
            store.bundles.push(bundle);
        }

        diag.into_result().map(|()| store)
    }

    pub fn get(&self, name: &str) -> Option<&Bundle> {
        self.index.get(name).map(|&i| &self.bundles[i])
    }

    /// Bundles in registration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Bundle> {
        self.bundles.iter()
    }

    /// Apply `profile` to the validated definitions.
    ///
    /// Only outputs change, so the name index stays valid.
    pub fn configure(self, profile: Profile) -> (Self, Settings) {
        let (bundles, settings) = configure(self.bundles, profile);
        let store = Self {
            bundles,
            index: self.index,
        };
        (store, settings)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

impl<'a> IntoIterator for &'a BundleStore {
    type Item = &'a Bundle;
    type IntoIter = std::slice::Iter<'a, Bundle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
