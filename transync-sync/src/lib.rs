//! # transync-sync
//!
//! Differential synchronization of a translated documentation tree with its
//! upstream source.
//!
//! [`SyncEngine::discover`] diffs each changed upstream document against its
//! recorded baseline and decides, per edit operation, whether the existing
//! translation survives. [`SyncEngine::apply_report`] (or [`run_batch`] for
//! concurrent runs) then translates only what must change, rewrites the
//! translation atomically and advances the baseline in the manifest.

pub mod apply;
pub mod cache;
pub mod classify;
pub mod diff;
pub mod error;
pub mod filters;
pub mod manifest;
pub mod oracle;
pub mod pipeline;
pub mod policy;
pub mod postprocess;
pub mod status;
pub mod vcs;
pub mod writer;

pub use apply::{apply, ApplyError};
pub use cache::{CacheStats, DatabaseStats, TranslationCache};
pub use classify::ChangeClassifier;
pub use diff::LineDiffAnalyzer;
pub use error::SyncError;
pub use filters::PathFilter;
pub use manifest::{ManifestManager, ManifestSummary};
pub use oracle::{HeuristicOracle, LlmOracle, SemanticChangeOracle};
pub use pipeline::{
    run_batch, BatchReport, DiscoveryReport, DiscoveryRequest, DocumentFailure, DocumentPlan,
    DocumentReport, PlanMode, SkippedDocument, SyncEngine,
};
pub use policy::{DocumentContext, PolicyEngine, PolicyStats};
pub use status::{StatusRow, StatusSignal};
pub use vcs::{ChangeStatus, ChangedPath, GitCli, InMemoryVcs, VcsError, VersionControl};
pub use writer::{write_document, WriteResult};
