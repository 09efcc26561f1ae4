//! Bundle definitions file (`assets.yml`).
//!
//! # Example
//!
//! ```yaml
//! app_css:
//!   contents:
//!     - css/reset.css
//!     - css/**/*.css
//!   depends: scss/**/*.scss      # single pattern or list
//!   filters: cssmin              # list or comma-separated string
//!   output: gen/app.css
//!
//! app_js:
//!   contents: [js/vendor/*.js, js/app.js]
//!   filters: [jsmin]
//!   output: gen/app.js
//! ```
//!
//! Mapping order is registration order.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;

use super::{ConfigDiagnostics, ConfigError, FieldPath};
use crate::bundle::Bundle;

/// One pattern or a list of patterns.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_patterns(self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        }
    }

    /// Filters also accept `"cssrewrite, cssmin"`.
    fn into_filter_names(self) -> Vec<String> {
        let names = match self {
            Self::One(s) => vec![s],
            Self::Many(v) => v,
        };
        names
            .iter()
            .flat_map(|s| s.split(','))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBundle {
    #[serde(default)]
    contents: Option<OneOrMany>,
    #[serde(default)]
    depends: Option<OneOrMany>,
    #[serde(default)]
    filters: Option<OneOrMany>,
    #[serde(default)]
    output: Option<String>,
}

impl RawBundle {
    fn into_bundle(self, name: String) -> Bundle {
        Bundle::new(name, self.output.unwrap_or_default())
            .with_contents(self.contents.map(OneOrMany::into_patterns).unwrap_or_default())
            .with_depends(self.depends.map(OneOrMany::into_patterns).unwrap_or_default())
            .with_filters(self.filters.map(OneOrMany::into_filter_names).unwrap_or_default())
    }
}

/// Load bundle definitions from `path`.
///
/// A missing file yields no bundles (the Environment is simply empty).
pub fn load_bundles(path: &Path) -> Result<Vec<Bundle>, ConfigError> {
    if !path.is_file() {
        crate::debug!("config"; "no bundle definitions at {}", path.display());
        return Ok(Vec::new());
    }

    let content =
        fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
    parse_bundles(&content).map_err(|e| match e {
        ParseError::Yaml(err) => ConfigError::Yaml(path.to_path_buf(), err),
        ParseError::Diagnostics(diag) => ConfigError::Diagnostics(diag),
    })
}

enum ParseError {
    Yaml(serde_yaml::Error),
    Diagnostics(ConfigDiagnostics),
}

/// Parse `assets.yml` content into bundles, in document order.
fn parse_bundles(content: &str) -> Result<Vec<Bundle>, ParseError> {
    let document: Value = serde_yaml::from_str(content).map_err(ParseError::Yaml)?;

    let mapping = match document {
        Value::Null => return Ok(Vec::new()),
        Value::Mapping(mapping) => mapping,
        _ => {
            let mut diag = ConfigDiagnostics::new();
            diag.error(
                FieldPath::new("bundles"),
                "expected a mapping of bundle name to definition",
            );
            return Err(ParseError::Diagnostics(diag));
        }
    };

    let mut diag = ConfigDiagnostics::new();
    let mut bundles = Vec::with_capacity(mapping.len());

    for (key, value) in mapping {
        let Value::String(name) = key else {
            diag.error(
                FieldPath::new("bundles"),
                format!("bundle name must be a string, found {key:?}"),
            );
            continue;
        };

        match serde_yaml::from_value::<RawBundle>(value) {
            Ok(raw) => bundles.push(raw.into_bundle(name)),
            Err(e) => diag.error(FieldPath::new(format!("bundles.{name}")), e.to_string()),
        }
    }

    diag.into_result()
        .map(|()| bundles)
        .map_err(ParseError::Diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(content: &str) -> Vec<Bundle> {
        match parse_bundles(content) {
            Ok(bundles) => bundles,
            Err(ParseError::Yaml(e)) => panic!("yaml error: {e}"),
            Err(ParseError::Diagnostics(d)) => panic!("diagnostics: {d}"),
        }
    }

    #[test]
    fn test_parse_full_definition() {
        let bundles = parse(
            "app_css:\n  contents:\n    - css/reset.css\n    - css/**/*.css\n  depends: scss/**/*.scss\n  filters: cssmin\n  output: gen/app.css\n",
        );

        assert_eq!(bundles.len(), 1);
        let b = &bundles[0];
        assert_eq!(b.name, "app_css");
        assert_eq!(b.contents, ["css/reset.css", "css/**/*.css"]);
        assert_eq!(b.depends, ["scss/**/*.scss"]);
        assert_eq!(b.filters, ["cssmin"]);
        assert_eq!(b.output, "gen/app.css");
    }

    #[test]
    fn test_document_order_is_kept() {
        let bundles = parse(
            "zeta:\n  contents: a.js\n  output: z.js\nalpha:\n  contents: b.js\n  output: a.js\n",
        );
        let names: Vec<_> = bundles.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha"]);
    }

    #[test]
    fn test_comma_separated_filters() {
        let bundles =
            parse("app:\n  contents: a.css\n  filters: 'sass, cssmin'\n  output: a.css\n");
        assert_eq!(bundles[0].filters, ["sass", "cssmin"]);
    }

    #[test]
    fn test_missing_fields_default_empty() {
        let bundles = parse("app:\n  output: gen/app.js\n");
        assert!(bundles[0].contents.is_empty());
        assert!(bundles[0].depends.is_empty());
        assert!(bundles[0].filters.is_empty());
    }

    #[test]
    fn test_empty_document() {
        assert!(parse("").is_empty());
        assert!(parse("# no bundles yet\n").is_empty());
    }

    #[test]
    fn test_unknown_field_reported() {
        let Err(ParseError::Diagnostics(diag)) =
            parse_bundles("app:\n  contents: a.js\n  output: a.js\n  outptu: typo\n")
        else {
            panic!("expected diagnostics");
        };
        assert_eq!(diag.errors()[0].field.as_str(), "bundles.app");
    }

    #[test]
    fn test_non_mapping_document() {
        assert!(matches!(
            parse_bundles("- just\n- a list\n"),
            Err(ParseError::Diagnostics(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let bundles = load_bundles(&dir.path().join("assets.yml")).unwrap();
        assert!(bundles.is_empty());
    }

    #[test]
    fn test_load_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("assets.yml");
        fs::write(&path, "app: [unclosed").unwrap();
        assert!(matches!(load_bundles(&path), Err(ConfigError::Yaml(..))));
    }
}
