//! `transync manifest list|remove|set-baseline`

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use transync_core::DocPath;
use transync_sync::status::format_datetime_age;
use transync_sync::{ManifestManager, VersionControl};

use super::Workspace;

#[derive(Subcommand, Debug)]
pub enum ManifestCommand {
    /// List recorded documents.
    List {
        /// Emit the raw manifest as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Forget one document so the next run treats it as never synced.
    Remove {
        /// Document path, relative to the repository root.
        path: String,
    },

    /// Set the baseline used by documents without their own entry.
    SetBaseline {
        /// Any revision git can resolve.
        revision: String,
    },
}

#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "document")]
    document: String,
    #[tabled(rename = "baseline")]
    baseline: String,
    #[tabled(rename = "strategy")]
    strategy: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
}

pub fn run(root: &Path, command: ManifestCommand) -> Result<()> {
    let workspace = Workspace::load(root)?;
    let manifest = ManifestManager::open(workspace.config.manifest_path_at(root));

    match command {
        ManifestCommand::List { json } => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&manifest.snapshot())
                        .context("failed to serialize manifest")?
                );
                return Ok(());
            }
            let summary = manifest.summary();
            let by_strategy: Vec<String> = summary
                .by_strategy
                .iter()
                .map(|(strategy, n)| format!("{strategy}: {n}"))
                .collect();
            println!(
                "{} documents | default baseline {} | {}",
                summary.total,
                summary
                    .default_baseline
                    .as_ref()
                    .map(|b| b.short().to_string())
                    .unwrap_or_else(|| "none".to_string()),
                if by_strategy.is_empty() {
                    "no entries".to_string()
                } else {
                    by_strategy.join(", ")
                }
            );
            let rows: Vec<EntryRow> = manifest
                .entries()
                .into_iter()
                .map(|(path, entry)| EntryRow {
                    document: path.to_string(),
                    baseline: entry.baseline_revision.short().to_string(),
                    strategy: entry.strategy.to_string(),
                    last_sync: format_datetime_age(entry.last_synced_at),
                })
                .collect();
            if !rows.is_empty() {
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
        }
        ManifestCommand::Remove { path } => {
            let doc = DocPath::from(path);
            if !manifest
                .remove(&doc)
                .with_context(|| format!("failed to update '{}'", manifest.path().display()))?
            {
                bail!("'{doc}' is not in the manifest");
            }
            println!("✓ Removed '{doc}'");
        }
        ManifestCommand::SetBaseline { revision } => {
            let resolved = workspace
                .git()
                .resolve(&revision)
                .with_context(|| format!("cannot resolve '{revision}'"))?;
            manifest
                .set_default_baseline(&resolved)
                .with_context(|| format!("failed to update '{}'", manifest.path().display()))?;
            println!("✓ Default baseline set to {}", resolved.short());
        }
    }
    Ok(())
}
