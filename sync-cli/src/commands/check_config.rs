//! Print the effective engine options.

use anyhow::{Context, Result};

use crate::config::Loaded;

/// Run the check-config command.
pub fn run(loaded: &Loaded) -> Result<()> {
    print!("{}", render(loaded)?);
    Ok(())
}

fn render(loaded: &Loaded) -> Result<String> {
    let toml = loaded
        .options
        .to_toml_string()
        .context("Failed to render options")?;
    Ok(format!("# options from {}\n{}", loaded.source, toml))
}
