//! Prompt file helpers.

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

/// System prompt for outline generation (static, no variables).
pub const OUTLINE_SYSTEM_PROMPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/outline_system_prompt.md"
));

/// Prompt template for whole-deck generation (`MiniJinja`).
pub const DECK_PROMPT_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/deck_prompt.md"
));

/// Prompt template for single-slide generation (`MiniJinja`).
pub const SLIDE_PROMPT_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/slide_prompt.md"
));

#[derive(Serialize)]
struct DeckPromptVars<'a> {
    user_prompt: &'a str,
    outline: &'a str,
}

#[derive(Serialize)]
struct SlidePromptVars<'a> {
    user_prompt: &'a str,
    slide_content: &'a str,
    slide_number: usize,
    total: usize,
}

/// Renders the whole-deck generation prompt from the user request and the
/// outline produced by the outline stage.
pub fn render_deck_prompt(user_prompt: &str, outline: &str) -> Result<String> {
    render(
        "deck_prompt",
        DECK_PROMPT_TEMPLATE,
        &DeckPromptVars {
            user_prompt,
            outline,
        },
    )
}

/// Renders the generation prompt for one slide. `slide_number` is 1-based.
pub fn render_slide_prompt(
    user_prompt: &str,
    slide_content: &str,
    slide_number: usize,
    total: usize,
) -> Result<String> {
    render(
        "slide_prompt",
        SLIDE_PROMPT_TEMPLATE,
        &SlidePromptVars {
            user_prompt,
            slide_content,
            slide_number,
            total,
        },
    )
}

fn render<T: Serialize>(name: &str, template: &str, vars: &T) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    // Template names stay extension-less so MiniJinja never applies HTML
    // auto-escaping to the interpolated outline text.
    env.add_template(name, template)
        .with_context(|| format!("failed to register {name} template"))?;

    env.get_template(name)
        .with_context(|| format!("failed to load {name} template"))?
        .render(vars)
        .with_context(|| format!("failed to render {name} template"))
}
