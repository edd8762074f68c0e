pub mod apply;
pub mod cache;
pub mod diff;
pub mod discover;
pub mod init;
pub mod manifest;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;

use transync_core::{config, Config};
use transync_llm::{GeminiTranslator, MockTranslator, StyleGuide, TranslationService};
use transync_sync::{
    run_batch, BatchReport, DiscoveryReport, GitCli, HeuristicOracle, LlmOracle,
    SemanticChangeOracle, SyncEngine, WriteResult,
};

/// Loaded configuration for one repository root.
pub struct Workspace {
    pub root: PathBuf,
    pub config: Config,
}

impl Workspace {
    pub fn load(root: &Path) -> Result<Self> {
        let mut config = config::load_at(root)
            .with_context(|| format!("failed to load config under '{}'", root.display()))?;
        config
            .apply_env_overrides(|key| std::env::var(key).ok())
            .context("invalid GEMINI_* environment override")?;
        config.validate().context("invalid configuration")?;
        Ok(Self {
            root: root.to_path_buf(),
            config,
        })
    }

    pub fn git(&self) -> GitCli {
        GitCli::new(&self.root)
    }

    pub fn engine(&self, opts: &ServiceArgs) -> Result<SyncEngine> {
        let translator: Arc<dyn TranslationService> = if opts.mock {
            Arc::new(MockTranslator::default())
        } else {
            let guide = StyleGuide::load(&self.root, &self.config.llm);
            let client = GeminiTranslator::from_env(self.config.llm.clone(), guide)
                .context("set GEMINI_API_KEY or pass --mock")?;
            Arc::new(client)
        };
        let oracle: Arc<dyn SemanticChangeOracle> = if opts.mock || opts.heuristic {
            Arc::new(HeuristicOracle)
        } else {
            Arc::new(LlmOracle::new(Arc::clone(&translator)))
        };
        SyncEngine::open(
            &self.root,
            self.config.clone(),
            Arc::new(self.git()),
            translator,
            oracle,
        )
        .context("failed to open sync engine")
    }
}

/// Which translation backend to use.
#[derive(Args, Debug, Clone, Default)]
pub struct ServiceArgs {
    /// Use the offline mock translator instead of Gemini.
    #[arg(long)]
    pub mock: bool,

    /// Judge non-minor changes by length only, without asking the service.
    #[arg(long)]
    pub heuristic: bool,
}

/// Run `report` sequentially, or on a worker pool when `jobs > 1`.
pub fn execute(
    engine: SyncEngine,
    report: DiscoveryReport,
    dry_run: bool,
    jobs: usize,
) -> Result<BatchReport> {
    if jobs <= 1 {
        return engine
            .apply_report(&report, dry_run)
            .context("sync aborted");
    }
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;
    runtime
        .block_on(run_batch(Arc::new(engine), report, dry_run, jobs))
        .context("sync aborted")
}

/// Print a batch and fail when any document failed.
pub fn finish_batch(batch: &BatchReport, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(batch).context("failed to serialize batch report")?
        );
    } else {
        print_batch(batch);
    }
    if !batch.is_success() {
        bail!("{} document(s) failed", batch.failures.len());
    }
    Ok(())
}

fn print_batch(batch: &BatchReport) {
    let prefix = if batch.dry_run { "[dry-run] " } else { "" };
    if batch.documents.is_empty() && batch.failures.is_empty() && batch.skipped.is_empty() {
        println!("{prefix}✓ up to date at {}", batch.target_revision.short());
        return;
    }

    let written = batch
        .documents
        .iter()
        .filter(|d| {
            matches!(
                d.write,
                Some(WriteResult::Written { .. } | WriteResult::WouldWrite { .. })
            )
        })
        .count();
    println!(
        "{prefix}✓ synced to {} ({} written, {} unchanged, {} failed)",
        batch.target_revision.short(),
        written,
        batch.documents.len() - written,
        batch.failures.len()
    );

    for doc in &batch.documents {
        let mark = match doc.write {
            Some(WriteResult::Written { .. }) => "✎",
            Some(WriteResult::WouldWrite { .. }) => "~",
            Some(WriteResult::Unchanged { .. }) | None => "·",
        };
        println!("  {mark}  {} ({})", doc.path, doc.strategy);
        for w in &doc.warnings {
            println!("       ! {w}");
        }
    }
    for skipped in &batch.skipped {
        println!("  -  {} ({})", skipped.path, skipped.reason);
    }
    for failure in &batch.failures {
        println!("  ✗  {}: {}", failure.path, failure.reason);
    }
    if batch.baseline_advanced {
        println!("Default baseline is now {}.", batch.target_revision.short());
    }
}
