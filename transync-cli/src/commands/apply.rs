//! `transync apply --changes FILE` — execute a discovery plan.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use transync_sync::DiscoveryReport;

use super::{execute, finish_batch, ServiceArgs, Workspace};

/// Arguments for `transync apply`.
#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Plan written by `transync discover`.
    #[arg(long, value_name = "FILE")]
    pub changes: PathBuf,

    /// Show what would be written without touching files or the manifest.
    #[arg(long)]
    pub dry_run: bool,

    /// Documents processed concurrently.
    #[arg(long, short = 'j', default_value_t = 1)]
    pub jobs: usize,

    /// Emit the batch report as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub service: ServiceArgs,
}

impl ApplyArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let text = std::fs::read_to_string(&self.changes)
            .with_context(|| format!("failed to read '{}'", self.changes.display()))?;
        let report: DiscoveryReport = serde_json::from_str(&text)
            .with_context(|| format!("'{}' is not a discovery report", self.changes.display()))?;

        let workspace = Workspace::load(root)?;
        let engine = workspace.engine(&self.service)?;
        let batch = execute(engine, report, self.dry_run, self.jobs)?;
        finish_batch(&batch, self.json)
    }
}
