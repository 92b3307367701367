//! Segment command handler.

use anyhow::{Context, Result};
use deckgen_core::core::outline::segment;

/// Reads an outline file and prints one block per slide, the same split
/// the deck pipeline uses.
pub fn run(file: &str) -> Result<()> {
    let outline =
        std::fs::read_to_string(file).with_context(|| format!("read outline file {file}"))?;

    for block in segment(&outline) {
        println!("--- slide {} ---", block.index + 1);
        println!("{}", block.content.trim_end());
    }

    Ok(())
}
