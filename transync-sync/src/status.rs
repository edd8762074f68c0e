//! Per-document sync status.
//!
//! Signal precedence:
//! 1. `Missing` (translated file absent)
//! 2. `UpstreamDeleted` (document removed upstream since its baseline)
//! 3. `Behind` (upstream document changed since its baseline)
//! 4. `Current`

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use transync_core::{DocPath, RevisionId, SyncStrategy};

use crate::error::SyncError;
use crate::manifest::ManifestManager;
use crate::vcs::{ChangeStatus, VersionControl};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum StatusSignal {
    Current,
    Behind { baseline: RevisionId },
    UpstreamDeleted,
    Missing,
}

impl StatusSignal {
    pub fn label(&self) -> &'static str {
        match self {
            StatusSignal::Current => "current",
            StatusSignal::Behind { .. } => "behind",
            StatusSignal::UpstreamDeleted => "upstream deleted",
            StatusSignal::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRow {
    pub path: DocPath,
    #[serde(flatten)]
    pub signal: StatusSignal,
    pub strategy: SyncStrategy,
    pub last_synced_at: DateTime<Utc>,
}

/// Check every manifest entry against `head`.
///
/// Each distinct baseline is diffed against `head` once.
pub fn check(
    manifest: &ManifestManager,
    vcs: &dyn VersionControl,
    translated_root: &Path,
    head: &RevisionId,
) -> Result<Vec<StatusRow>, SyncError> {
    let entries = manifest.entries();

    let baselines: BTreeSet<RevisionId> = entries
        .iter()
        .map(|(_, e)| e.baseline_revision.clone())
        .filter(|b| b != head)
        .collect();
    let mut changes: BTreeMap<RevisionId, BTreeMap<DocPath, ChangeStatus>> = BTreeMap::new();
    for baseline in baselines {
        let changed = vcs
            .changed_paths(&baseline, head)?
            .into_iter()
            .map(|c| (c.path, c.status))
            .collect();
        changes.insert(baseline, changed);
    }

    let mut rows = Vec::with_capacity(entries.len());
    for (path, entry) in entries {
        let changed = changes
            .get(&entry.baseline_revision)
            .and_then(|m| m.get(&path));
        let signal = if !translated_root.join(path.as_str()).exists() {
            StatusSignal::Missing
        } else {
            match changed {
                Some(ChangeStatus::Deleted) => StatusSignal::UpstreamDeleted,
                Some(_) => StatusSignal::Behind {
                    baseline: entry.baseline_revision.clone(),
                },
                None => StatusSignal::Current,
            }
        };
        rows.push(StatusRow {
            path,
            signal,
            strategy: entry.strategy,
            last_synced_at: entry.last_synced_at,
        });
    }
    Ok(rows)
}

/// Compact age of a timestamp (`42s`, `5m`, `3h`, `2d`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now()
        .signed_duration_since(timestamp)
        .num_seconds()
        .max(0) as u64;
    format_seconds(age)
}

pub fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
