//! `transync discover` — plan a sync without writing anything.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use transync_core::DocPath;
use transync_sync::DiscoveryRequest;

use super::{ServiceArgs, Workspace};

/// Arguments for `transync discover`.
#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Target revision (defaults to the upstream tracking branch).
    #[arg(long = "to", value_name = "REV")]
    pub target: Option<String>,

    /// Only consider these documents.
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<String>,

    /// Write the plan here instead of stdout.
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub service: ServiceArgs,
}

impl DiscoverArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let workspace = Workspace::load(root)?;
        let engine = workspace.engine(&self.service)?;
        let request = DiscoveryRequest {
            target: self.target,
            paths: self.paths.into_iter().map(DocPath::from).collect(),
        };
        let report = engine.discover(&request).context("discovery failed")?;
        let json =
            serde_json::to_string_pretty(&report).context("failed to serialize discovery report")?;

        match self.output {
            Some(path) => {
                std::fs::write(&path, json + "\n")
                    .with_context(|| format!("failed to write '{}'", path.display()))?;
                eprintln!(
                    "✓ {} document(s) planned against {} → {}",
                    report.documents.len(),
                    report.target_revision.short(),
                    path.display()
                );
            }
            None => println!("{json}"),
        }
        for failure in &report.failures {
            eprintln!("✗ {}: {}", failure.path, failure.reason);
        }
        Ok(())
    }
}
