//! tola-assets - bundle, version and watch static assets.
//!
//! Bundles are declared in `assets.yml`, resolved against an asset
//! directory, run through a filter chain and written as one artifact each.
//! An [`Environment`] owns the bundle set and the build engine; the
//! [`watch`] module rebuilds it on change.

pub mod logger;

pub mod build;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod env;
pub mod filter;
pub mod freshness;
pub mod manifest;
pub mod profile;
pub mod utils;
pub mod watch;

pub use build::{BuildEngine, BuildError, BuildReport, BuildResult, BuildStatus};
pub use bundle::{Bundle, BundleStore};
pub use env::{Environment, EnvironmentOptions};
pub use manifest::{Manifest, ManifestEntry};
pub use profile::{Profile, Settings};
