//! External command filters declared under `[filters.<name>]`.

use anyhow::{Context, Result};

use super::{Filter, FilterContext};
use crate::utils::exec::Cmd;

/// Pipes bundle content through an external program.
///
/// The program runs in the asset root, reads the content on stdin and
/// writes the result to stdout. A non-zero exit fails the filter.
#[derive(Debug, Clone)]
pub struct CommandFilter {
    name: String,
    command: Vec<String>,
}

impl CommandFilter {
    pub fn new(name: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command,
        }
    }
}

impl Filter for CommandFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, input: String, ctx: &FilterContext<'_>) -> Result<String> {
        let output = Cmd::from_slice(&self.command)
            .cwd(ctx.directory)
            .envs([("TOLA_ASSETS_BUNDLE", ctx.bundle)])
            .stdin(input)
            .run()?;

        String::from_utf8(output.stdout).with_context(|| {
            let program = self.command.first().map_or("", String::as_str);
            format!("`{program}` produced non UTF-8 output")
        })
    }
}
