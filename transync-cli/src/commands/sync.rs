//! `transync sync` — discover, then apply.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use transync_core::DocPath;
use transync_sync::DiscoveryRequest;

use super::{execute, finish_batch, ServiceArgs, Workspace};

/// Arguments for `transync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Target revision (defaults to the upstream tracking branch).
    #[arg(long = "to", value_name = "REV")]
    pub target: Option<String>,

    /// Only sync these documents.
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<String>,

    /// Fetch the upstream remote first.
    #[arg(long)]
    pub fetch: bool,

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

impl SyncArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let workspace = Workspace::load(root)?;
        if self.fetch {
            let remote = &workspace.config.upstream.remote;
            workspace
                .git()
                .fetch(remote)
                .with_context(|| format!("failed to fetch '{remote}'"))?;
        }

        let engine = workspace.engine(&self.service)?;
        let request = DiscoveryRequest {
            target: self.target,
            paths: self.paths.into_iter().map(DocPath::from).collect(),
        };
        let report = engine.discover(&request).context("discovery failed")?;
        let batch = execute(engine, report, self.dry_run, self.jobs)?;
        finish_batch(&batch, self.json)
    }
}
