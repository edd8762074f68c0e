//! `transync diff <path>` — upstream change of one document since its baseline.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use transync_core::DocPath;
use transync_sync::diff::render_unified;
use transync_sync::{ManifestManager, VersionControl};

use super::Workspace;

/// Arguments for `transync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Document path, relative to the repository root.
    pub path: String,

    /// Target revision (defaults to the upstream tracking branch).
    #[arg(long = "to", value_name = "REV")]
    pub target: Option<String>,
}

impl DiffArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let workspace = Workspace::load(root)?;
        let git = workspace.git();
        let manifest = ManifestManager::open(workspace.config.manifest_path_at(root));
        let doc = DocPath::from(self.path);

        let target_ref = self
            .target
            .unwrap_or_else(|| workspace.config.upstream.tracking_ref());
        let target = git
            .resolve(&target_ref)
            .with_context(|| format!("cannot resolve '{target_ref}'"))?;
        let baseline = manifest
            .baseline(&doc)
            .with_context(|| format!("no baseline recorded for '{doc}'; run `transync sync` first"))?;

        let old = git
            .read_file_at(&doc, &baseline)
            .with_context(|| format!("failed to read '{doc}' at {}", baseline.short()))?
            .unwrap_or_default();
        let new = git
            .read_file_at(&doc, &target)
            .with_context(|| format!("failed to read '{doc}' at {}", target.short()))?
            .unwrap_or_default();

        if old == new {
            println!(
                "No upstream changes for '{doc}' between {} and {}.",
                baseline.short(),
                target.short()
            );
            return Ok(());
        }

        let diff = render_unified(
            &old,
            &new,
            &format!("{doc}@{}", baseline.short()),
            &format!("{doc}@{}", target.short()),
        );
        print!("{diff}");
        if !diff.ends_with('\n') {
            println!();
        }
        Ok(())
    }
}
