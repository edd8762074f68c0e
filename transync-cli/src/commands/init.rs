//! `transync init [--force]`

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;

use transync_core::{config, Config};

/// Write a default configuration file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let path = config::config_path_at(root);
        if path.exists() && !self.force {
            bail!(
                "'{}' already exists; pass --force to overwrite",
                path.display()
            );
        }
        let saved = config::save_at(root, &Config::default())
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        println!("✓ Wrote {}", saved.display());
        Ok(())
    }
}
