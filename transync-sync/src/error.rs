//! Error types for transync-sync.

use std::path::PathBuf;

use thiserror::Error;

use transync_core::{ConfigError, DocPath, RevisionId};
use transync_llm::LlmError;

use crate::apply::ApplyError;
use crate::vcs::VcsError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (manifest, change reports).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The translation cache database failed in a way that cannot be degraded.
    #[error("cache database error: {0}")]
    Cache(#[from] rusqlite::Error),

    #[error("version control error: {0}")]
    Vcs(#[from] VcsError),

    /// The translation service failed terminally for one line.
    #[error("translation failed for {path} line {line}: {source}")]
    Translation {
        path: DocPath,
        line: usize,
        #[source]
        source: LlmError,
    },

    #[error("cannot apply changes: {0}")]
    Apply(#[from] ApplyError),

    /// The manifest could not be persisted; the document stays unrecorded.
    #[error("failed to write manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The upstream document is absent at a revision it should exist at.
    #[error("{path} does not exist at revision {revision}")]
    MissingUpstream { path: DocPath, revision: RevisionId },

    /// A batch worker panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Task(String),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
