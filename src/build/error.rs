//! Per-bundle build errors.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::bundle::ResolveError;

/// Why one bundle failed to build.
///
/// Scoped to that bundle: its previous artifact and manifest entry stay in
/// place and the rest of the pass continues.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("bundle `{bundle}`: cannot resolve contents")]
    Resolution {
        bundle: String,
        #[source]
        source: ResolveError,
    },

    #[error("bundle `{bundle}`: filter chain failed")]
    Filter {
        bundle: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("bundle `{bundle}`: IO error on `{path}`")]
    Io {
        bundle: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unknown bundle `{0}`")]
    UnknownBundle(String),

    #[error("bundle `{0}`: no asset directory")]
    Inert(String),
}

impl BuildError {
    /// Name of the failing bundle.
    pub fn bundle(&self) -> &str {
        match self {
            Self::Resolution { bundle, .. }
            | Self::Filter { bundle, .. }
            | Self::Io { bundle, .. } => bundle,
            Self::UnknownBundle(name) | Self::Inert(name) => name,
        }
    }

    /// The error followed by its whole source chain, `: `-separated.
    pub fn detail(&self) -> String {
        let mut message = self.to_string();
        let mut source = self.source();
        while let Some(err) = source {
            message.push_str(": ");
            message.push_str(&err.to_string());
            source = err.source();
        }
        message
    }
}
