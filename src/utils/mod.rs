//! Shared helpers.
//!
//! - [`path`]: path normalization and URL path building
//! - [`exec`]: external command execution

pub mod exec;
pub mod path;
