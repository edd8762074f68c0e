//! `transync status` — where each synced document stands against upstream.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use transync_core::RevisionId;
use transync_sync::status::{check, format_datetime_age};
use transync_sync::{ManifestManager, StatusRow, StatusSignal, VersionControl};

use super::Workspace;

/// Arguments for `transync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Compare against this revision (defaults to the upstream tracking branch).
    #[arg(long = "to", value_name = "REV")]
    pub target: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, root: &Path) -> Result<()> {
        let workspace = Workspace::load(root)?;
        let git = workspace.git();
        let manifest = ManifestManager::open(workspace.config.manifest_path_at(root));

        let target_ref = self
            .target
            .unwrap_or_else(|| workspace.config.upstream.tracking_ref());
        let head = git
            .resolve(&target_ref)
            .with_context(|| format!("cannot resolve '{target_ref}'"))?;
        let rows = check(
            &manifest,
            &git,
            &workspace.config.translated_root_at(root),
            &head,
        )
        .context("status check failed")?;

        if self.json {
            print_json(&head, manifest.default_baseline(), &rows)?;
            return Ok(());
        }
        print_table(&head, manifest.default_baseline(), rows);
        Ok(())
    }
}

#[derive(Serialize)]
struct StatusReportJson<'a> {
    summary: StatusSummaryJson<'a>,
    documents: &'a [StatusRow],
}

#[derive(Serialize)]
struct StatusSummaryJson<'a> {
    head: &'a RevisionId,
    default_baseline: Option<RevisionId>,
    documents: usize,
    needs_sync: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "document")]
    document: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "strategy")]
    strategy: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
}

fn needs_sync(rows: &[StatusRow]) -> usize {
    rows.iter()
        .filter(|r| !matches!(r.signal, StatusSignal::Current))
        .count()
}

fn print_json(head: &RevisionId, default_baseline: Option<RevisionId>, rows: &[StatusRow]) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            head,
            default_baseline,
            documents: rows.len(),
            needs_sync: needs_sync(rows),
        },
        documents: rows,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(head: &RevisionId, default_baseline: Option<RevisionId>, rows: Vec<StatusRow>) {
    let pending = needs_sync(&rows);
    println!(
        "transync v{} | head {} | baseline {} | {} documents | {} need sync",
        env!("CARGO_PKG_VERSION"),
        head.short(),
        default_baseline
            .as_ref()
            .map(|b| b.short().to_string())
            .unwrap_or_else(|| "none".to_string()),
        rows.len(),
        pending,
    );

    if rows.is_empty() {
        println!("No documents recorded. Run `transync sync` first.");
        return;
    }

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            document: row.path.to_string(),
            status: signal_cell(&row.signal),
            strategy: row.strategy.to_string(),
            last_sync: format_datetime_age(row.last_synced_at),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if pending > 0 {
        println!("Run 'transync sync' to bring pending documents up to date.");
    }
}

fn signal_cell(signal: &StatusSignal) -> String {
    let label = signal.label().to_uppercase();
    match signal {
        StatusSignal::Current => label.green().to_string(),
        StatusSignal::Behind { baseline } => {
            format!("{} (since {})", label.yellow(), baseline.short())
        }
        StatusSignal::UpstreamDeleted => label.magenta().to_string(),
        StatusSignal::Missing => label.red().to_string(),
    }
}
