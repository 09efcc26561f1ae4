//! Built-in minifiers: oxc for JavaScript, lightningcss for CSS.
//!
//! Both are identity transforms unless the profile supplies minifier flags.

use anyhow::{Result, anyhow, bail};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::{Filter, FilterContext};
use crate::profile::{CssMinifyArgs, JsMinifyArgs};

/// `cssmin`
#[derive(Debug, Clone, Copy)]
pub struct CssMin;

impl Filter for CssMin {
    fn name(&self) -> &str {
        "cssmin"
    }

    fn apply(&self, input: String, ctx: &FilterContext<'_>) -> Result<String> {
        match ctx.settings.minify {
            Some(args) => minify_css(&input, args.css),
            None => Ok(input),
        }
    }
}

/// `jsmin`
#[derive(Debug, Clone, Copy)]
pub struct JsMin;

impl Filter for JsMin {
    fn name(&self) -> &str {
        "jsmin"
    }

    fn apply(&self, input: String, ctx: &FilterContext<'_>) -> Result<String> {
        match ctx.settings.minify {
            Some(args) => minify_js(&input, args.js),
            None => Ok(input),
        }
    }
}

/// Minify JavaScript source code.
///
/// Bundles are plain concatenated scripts, so the source is parsed as a
/// classic script rather than a module.
pub fn minify_js(source: &str, args: JsMinifyArgs) -> Result<String> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if let Some(err) = ret.errors.first() {
        bail!("{err}");
    }

    let mut program = ret.program;
    let options = MinifierOptions {
        mangle: args.mangle.then(MangleOptions::default),
        compress: args.compress.then(CompressOptions::smallest),
    };
    let ret = Minifier::new(options).minify(&allocator, &mut program);

    Ok(Codegen::new()
        .with_options(CodegenOptions {
            minify: true,
            comments: CommentOptions::disabled(),
            ..CodegenOptions::default()
        })
        .with_scoping(ret.scoping)
        .build(&program)
        .code)
}

/// Minify CSS source code.
pub fn minify_css(source: &str, args: CssMinifyArgs) -> Result<String> {
    let mut stylesheet =
        StyleSheet::parse(source, ParserOptions::default()).map_err(|e| anyhow!("{e}"))?;

    if args.minify {
        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| anyhow!("{e}"))?;
    }

    let result = stylesheet
        .to_css(PrinterOptions {
            minify: args.minify,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("{e}"))?;
    Ok(result.code)
}
