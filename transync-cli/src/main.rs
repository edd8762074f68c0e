//! transync — keep a translated documentation tree in step with upstream.
//!
//! # Usage
//!
//! ```text
//! transync [--root DIR] [--log-json] init [--force]
//! transync [--root DIR] discover [--to REV] [--path P]... [--output FILE]
//! transync [--root DIR] apply --changes FILE [--dry-run] [--mock] [--jobs N]
//! transync [--root DIR] sync [--to REV] [--path P]... [--fetch] [--dry-run] [--mock] [--jobs N]
//! transync [--root DIR] status [--to REV] [--json]
//! transync [--root DIR] diff <path> [--to REV]
//! transync [--root DIR] cache stats|prune [--days N]|clear
//! transync [--root DIR] manifest list|remove <path>|set-baseline <rev>
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    apply::ApplyArgs, cache::CacheCommand, diff::DiffArgs, discover::DiscoverArgs,
    init::InitArgs, manifest::ManifestCommand, status::StatusArgs, sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "transync",
    version,
    about = "Differential sync of translated documentation with its upstream",
    long_about = None,
)]
struct Cli {
    /// Repository root (holds `.transync/` and the translated tree).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Emit log lines on stderr as JSON objects.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default `.transync/config.yaml`.
    Init(InitArgs),

    /// Plan what changed upstream and emit the plan as JSON.
    Discover(DiscoverArgs),

    /// Execute a plan produced by `discover`.
    Apply(ApplyArgs),

    /// Discover and apply in one step.
    Sync(SyncArgs),

    /// Show per-document sync status.
    Status(StatusArgs),

    /// Show the upstream change of one document since its baseline.
    Diff(DiffArgs),

    /// Inspect or maintain the translation cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Inspect or edit the sync manifest.
    Manifest {
        #[command(subcommand)]
        command: ManifestCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let root = cli.root;
    match cli.command {
        Commands::Init(args) => args.run(&root),
        Commands::Discover(args) => args.run(&root),
        Commands::Apply(args) => args.run(&root),
        Commands::Sync(args) => args.run(&root),
        Commands::Status(args) => args.run(&root),
        Commands::Diff(args) => args.run(&root),
        Commands::Cache { command } => commands::cache::run(&root, command),
        Commands::Manifest { command } => commands::manifest::run(&root, command),
    }
}

/// `RUST_LOG`-driven logging on stderr; stdout stays free for reports.
fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
