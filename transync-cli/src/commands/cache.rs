//! `transync cache stats|prune|clear`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use tabled::{settings::Style, Table, Tabled};

use transync_sync::TranslationCache;

use super::Workspace;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show cache size and the files with the most entries.
    Stats {
        /// How many files to list.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Emit machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Drop entries not used for N days.
    Prune {
        /// Retention in days (defaults to `cache.retention_days`).
        #[arg(long)]
        days: Option<u32>,
    },

    /// Drop every entry.
    Clear,
}

#[derive(Tabled)]
struct TopFileRow {
    #[tabled(rename = "file")]
    file: String,
    #[tabled(rename = "entries")]
    entries: usize,
}

pub fn run(root: &Path, command: CacheCommand) -> Result<()> {
    let workspace = Workspace::load(root)?;
    let path = workspace.config.cache_path_at(root);
    let cache = TranslationCache::open(&path)
        .with_context(|| format!("failed to open cache '{}'", path.display()))?;

    match command {
        CacheCommand::Stats { top, json } => {
            let stats = cache
                .database_stats(top)
                .context("failed to read cache statistics")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stats).context("failed to serialize stats")?
                );
                return Ok(());
            }
            println!(
                "{} entries across {} files ({})",
                stats.total_entries,
                stats.distinct_files,
                path.display()
            );
            if !stats.top_files.is_empty() {
                let rows: Vec<TopFileRow> = stats
                    .top_files
                    .into_iter()
                    .map(|(file, entries)| TopFileRow { file, entries })
                    .collect();
                let mut table = Table::new(rows);
                table.with(Style::rounded());
                println!("{table}");
            }
        }
        CacheCommand::Prune { days } => {
            let days = days.unwrap_or(workspace.config.cache.retention_days);
            let removed = cache
                .prune_older_than(days)
                .context("failed to prune cache")?;
            println!("✓ Pruned {removed} entries unused for {days} days");
        }
        CacheCommand::Clear => {
            let removed = cache.clear().context("failed to clear cache")?;
            println!("✓ Cleared {removed} entries");
        }
    }
    Ok(())
}
