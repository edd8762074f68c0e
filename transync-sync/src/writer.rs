//! Atomic document writer.
//!
//! ## `write_document` protocol
//!
//! 1. Normalise line endings to LF.
//! 2. SHA-256 the content and the current file; identical ⇒ `Unchanged`.
//! 3. Dry run ⇒ `WouldWrite`.
//! 4. Write `<path>.transync.tmp`, then rename over `<path>`.
//!
//! A failed rename removes the temporary file, so a document is either fully
//! rewritten or left as it was. [`restore_document`] puts back bytes captured
//! before a write whose follow-up step failed.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::cache::content_hash;
use crate::error::{io_err, SyncError};

/// Outcome of one document write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WriteResult {
    Written { path: PathBuf },
    /// The file already had exactly this content.
    Unchanged { path: PathBuf },
    WouldWrite { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path }
            | WriteResult::Unchanged { path }
            | WriteResult::WouldWrite { path } => path,
        }
    }
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.transync.tmp", path.display()))
}

pub fn write_document(path: &Path, content: &str, dry_run: bool) -> Result<WriteResult, SyncError> {
    let normalized = content.replace("\r\n", "\n");
    let content = normalized.as_str();

    if let Ok(current) = std::fs::read_to_string(path) {
        if content_hash(&current.replace("\r\n", "\n")) == content_hash(content) {
            tracing::debug!("unchanged: {}", path.display());
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
    }

    if dry_run {
        tracing::info!("[dry-run] would write: {}", path.display());
        return Ok(WriteResult::WouldWrite {
            path: path.to_path_buf(),
        });
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, content).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }

    tracing::info!("wrote: {}", path.display());
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Snapshot of `path` taken before a write; `None` when it does not exist.
pub(crate) fn snapshot_document(path: &Path) -> Result<Option<Vec<u8>>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path, e)),
    }
}

/// Put `path` back to a [`snapshot_document`] result: the previous bytes via
/// tmp + rename, or removal when the file did not exist.
pub(crate) fn restore_document(path: &Path, previous: Option<&[u8]>) -> Result<(), SyncError> {
    let Some(bytes) = previous else {
        return match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(path, e)),
        };
    };
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    tracing::info!("restored: {}", path.display());
    Ok(())
}
