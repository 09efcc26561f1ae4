//! Filter chain: named content-to-content transforms.
//!
//! Filters are looked up by name in a [`FilterRegistry`]. Built-ins are the
//! minifiers `cssmin` and `jsmin`; `[filters.<name>]` entries of the config add
//! external commands. Unknown names are rejected when bundles are registered,
//! so a build never meets one.

mod command;
mod minify;

pub use command::CommandFilter;
pub use minify::{CssMin, JsMin, minify_css, minify_js};

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use rustc_hash::FxHashMap;

use crate::config::CommandFilterConfig;
use crate::profile::Settings;

/// What a filter knows about the bundle it is transforming.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub bundle: &'a str,
    pub settings: &'a Settings,
    /// Asset root; working directory of external commands.
    pub directory: &'a Path,
}

/// A pure content transform.
pub trait Filter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, input: String, ctx: &FilterContext<'_>) -> Result<String>;
}

/// Filters by name.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: FxHashMap<String, Arc<dyn Filter>>,
}

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding `cssmin` and `jsmin`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(CssMin);
        registry.register(JsMin);
        registry
    }

    /// Built-ins plus the external commands declared in the config.
    pub fn from_config(commands: &BTreeMap<String, CommandFilterConfig>) -> Self {
        let mut registry = Self::with_builtins();
        for (name, config) in commands {
            registry.register(CommandFilter::new(name.clone(), config.command.clone()));
        }
        registry
    }

    /// Add a filter, replacing any filter of the same name.
    pub fn register(&mut self, filter: impl Filter + 'static) {
        self.filters
            .insert(filter.name().to_string(), Arc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Filter>> {
        self.filters.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Apply `names` to `input` in order.
    ///
    /// The first failing filter aborts the chain; its name is part of the error.
    pub fn apply_chain(
        &self,
        names: &[String],
        input: String,
        ctx: &FilterContext<'_>,
    ) -> Result<String> {
        names.iter().try_fold(input, |content, name| {
            let filter = self
                .get(name)
                .ok_or_else(|| anyhow!("unknown filter `{name}`"))?;
            filter
                .apply(content, ctx)
                .map_err(|e| e.context(format!("filter `{name}` failed")))
        })
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}
