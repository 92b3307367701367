//! Final document assembly from fragments.
//!
//! Parallel generation produces one normalized fragment per slide; this
//! module merges them into a complete HTML document using a fixed page
//! skeleton. Streamed generation needs no assembly, only the marker
//! counting used to estimate progress.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use serde::Serialize;

/// Page skeleton shared by every assembled deck. Head and styles come
/// entirely from here; fragments only fill the slide container.
const DECK_SHELL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/templates/deck_shell.html"
));

#[derive(Serialize)]
struct ShellVars {
    slides: String,
}

/// Merges normalized fragments into a complete HTML document.
///
/// Fragments must already be in slide order; they are joined with
/// newlines and substituted into the skeleton's single placeholder.
/// Same fragments always yield the same document.
pub fn assemble(fragments: &[String]) -> Result<String> {
    let slides = fragments.join("\n");
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // No file extension on the template name: minijinja would otherwise
    // HTML-escape the fragments on substitution.
    env.add_template("deck_shell", DECK_SHELL)
        .context("register deck shell template")?;
    let html = env
        .get_template("deck_shell")
        .context("load deck shell template")?
        .render(ShellVars { slides })
        .context("render deck shell template")?;
    Ok(html)
}

/// Matches an opening tag carrying the slide marker class.
fn slide_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<div[^>]*class=["']slide["'][^>]*>"#).expect("valid slide marker regex")
    })
}

/// Counts slide containers visible in a (possibly partial) document.
///
/// Used to estimate progress while a whole-deck stream is in flight; a
/// container whose closing `>` has not arrived yet is not counted.
pub fn count_slide_markers(html: &str) -> usize {
    slide_marker_regex().find_iter(html).count()
}
