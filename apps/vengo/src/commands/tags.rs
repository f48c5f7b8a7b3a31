//! Tags command: prints the release tags published upstream, one per line.

use anyhow::{Context, Result};
use vengo_cache::Engine;

/// Executes the tags command.
///
/// # Errors
///
/// Returns an error if the tag feed cannot be fetched or parsed.
pub fn execute(engine: &Engine) -> Result<()> {
    let tags = engine
        .tags()
        .with_context(|| format!("failed to fetch tags from {}", engine.settings().tags_url))?;

    if tags.is_empty() {
        println!("No release tags available.");
        return Ok(());
    }
    for tag in &tags {
        println!("{tag}");
    }
    Ok(())
}
