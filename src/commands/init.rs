use anyhow::{Context, Result};
use std::path::Path;

use crate::config::EXAMPLE_CONFIG;
use crate::platform::common::atomic_write;

/// Write the example configuration file
pub fn init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse --force to overwrite",
            output.display()
        );
    }

    atomic_write(output, EXAMPLE_CONFIG.as_bytes())
        .with_context(|| format!("Failed to write config file: {}", output.display()))?;

    println!("✓ Created configuration file: {}", output.display());
    println!("\nSet service.base_url to your quiz backend and list your riddles.");
    println!("Then try: riddle-lock question");

    Ok(())
}
