//! Profile Configurator: development vs. production build settings.
//!
//! [`configure`] is run once per Environment. It derives a [`Settings`] value
//! and, in production, rewrites every bundle's output template so it carries
//! the version placeholder. Everything downstream reads `Settings` and never
//! asks which profile is active.

use crate::bundle::Bundle;

/// Placeholder substituted with the content hash when an artifact is written.
pub const VERSION_PLACEHOLDER: &str = "%(version)s";

/// Build profile, fixed for the lifetime of an Environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Development,
    Production,
}

impl Profile {
    pub const fn from_production(production: bool) -> Self {
        if production {
            Self::Production
        } else {
            Self::Development
        }
    }

    pub const fn settings(self) -> Settings {
        match self {
            Self::Development => Settings::DEVELOPMENT,
            Self::Production => Settings::PRODUCTION,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

/// Settings derived from a [`Profile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Serve bundle members individually instead of the merged artifact.
    pub debug_merge: bool,
    /// Skip rebuilding bundles whose inputs are unchanged.
    pub cache_enabled: bool,
    /// Record (and persist) version tokens and URLs per bundle.
    pub manifest_enabled: bool,
    /// Append `?v=<token>` to manifest URLs.
    pub url_expire: bool,
    /// Minifier flags; `None` turns the minifying filters into identity.
    pub minify: Option<MinifyArgs>,
}

impl Settings {
    pub const PRODUCTION: Self = Self {
        debug_merge: false,
        cache_enabled: true,
        manifest_enabled: true,
        url_expire: true,
        minify: Some(MinifyArgs::FIXED),
    };

    pub const DEVELOPMENT: Self = Self {
        debug_merge: true,
        cache_enabled: false,
        manifest_enabled: false,
        url_expire: false,
        minify: None,
    };
}

/// Fixed minifier flags, per filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MinifyArgs {
    pub js: JsMinifyArgs,
    pub css: CssMinifyArgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsMinifyArgs {
    pub compress: bool,
    pub mangle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CssMinifyArgs {
    pub minify: bool,
}

impl MinifyArgs {
    pub const FIXED: Self = Self {
        js: JsMinifyArgs {
            compress: true,
            mangle: true,
        },
        css: CssMinifyArgs { minify: true },
    };
}

/// Derive settings for `profile` and adjust bundle outputs accordingly.
///
/// Pure: touches no files, and applying it twice gives the same result.
pub fn configure(bundles: Vec<Bundle>, profile: Profile) -> (Vec<Bundle>, Settings) {
    let settings = profile.settings();
    let bundles = match profile {
        Profile::Development => bundles,
        Profile::Production => bundles
            .into_iter()
            .map(|mut b| {
                b.output = versioned_output(&b.output);
                b
            })
            .collect(),
    };
    (bundles, settings)
}

/// Insert the version placeholder before the file extension.
///
/// `gen/app.css` becomes `gen/app.%(version)s.css`; `gen/app` becomes
/// `gen/app.%(version)s`. Blank templates and templates that already carry
/// the placeholder are kept.
pub fn versioned_output(output: &str) -> String {
    if output.trim().is_empty() || output.contains(VERSION_PLACEHOLDER) {
        return output.to_string();
    }

    let file_start = output.rfind('/').map_or(0, |i| i + 1);
    let (dir, file) = output.split_at(file_start);

    // A leading dot (`.htaccess`) is not an extension.
    match file.rfind('.').filter(|&i| i > 0) {
        Some(dot) => format!("{dir}{}.{VERSION_PLACEHOLDER}{}", &file[..dot], &file[dot..]),
        None => format!("{output}.{VERSION_PLACEHOLDER}"),
    }
}

/// Replace the placeholder with `version`.
pub fn interpolate_version(template: &str, version: &str) -> String {
    template.replace(VERSION_PLACEHOLDER, version)
}
