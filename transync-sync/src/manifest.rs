//! Manifest manager — per-document sync baselines.
//!
//! Persists a single [`Manifest`] JSON document (default
//! `.transync/manifest.json`). Writes replace the whole document via
//! `<path>.tmp` + rename. Reads are optimistic: a missing or unreadable
//! manifest is an empty one, so a damaged file degrades to a full re-diff
//! instead of stopping the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use transync_core::types::MANIFEST_SCHEMA_VERSION;
use transync_core::{DocPath, Manifest, ManifestEntry, RevisionId, SyncStrategy};

use crate::error::{io_err, SyncError};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ManifestCompat {
    Structured(ManifestStructuredCompat),
    /// Single-revision metadata file: `{"upstream_sha": "<rev>"}`.
    Legacy { upstream_sha: RevisionId },
}

#[derive(Debug, Deserialize)]
struct ManifestStructuredCompat {
    schema_version: Option<u32>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    default_baseline: Option<RevisionId>,
    files: BTreeMap<DocPath, ManifestEntry>,
}

/// Load the manifest at `path`.
///
/// A missing file is an empty manifest; unreadable or malformed content is
/// an error (see [`ManifestManager::open`] for the forgiving variant).
pub fn load_at(path: &Path) -> Result<Manifest, SyncError> {
    if !path.exists() {
        return Ok(Manifest::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    match serde_json::from_str::<ManifestCompat>(&contents)? {
        ManifestCompat::Structured(m) => Ok(Manifest {
            schema_version: m.schema_version.unwrap_or(MANIFEST_SCHEMA_VERSION),
            updated_at: m.updated_at.unwrap_or_else(Utc::now),
            default_baseline: m.default_baseline,
            files: m.files,
        }),
        ManifestCompat::Legacy { upstream_sha } => Ok(Manifest {
            default_baseline: Some(upstream_sha),
            ..Manifest::default()
        }),
    }
}

/// Save `manifest` to `path` atomically.
pub fn save_at(path: &Path, manifest: &Manifest) -> Result<(), SyncError> {
    let write_err = |source: std::io::Error| SyncError::ManifestWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(write_err)?;
        }
    }
    let json = serde_json::to_string_pretty(manifest)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(write_err)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(write_err(e));
    }
    Ok(())
}

/// Counts for `transync manifest list` and reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManifestSummary {
    pub total: usize,
    pub by_strategy: BTreeMap<SyncStrategy, usize>,
    pub default_baseline: Option<RevisionId>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Shared handle over the manifest file.
///
/// All mutations go through one mutex and write the full document before the
/// in-memory copy is updated. A failed write leaves both disk and memory at
/// the previous state.
#[derive(Debug)]
pub struct ManifestManager {
    path: PathBuf,
    state: Mutex<Manifest>,
}

impl ManifestManager {
    /// Open the manifest at `path`, treating unreadable content as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let manifest = match load_at(&path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(
                    "manifest {} unreadable ({e}); treating every document as unsynced",
                    path.display()
                );
                Manifest::default()
            }
        };
        Self {
            path,
            state: Mutex::new(manifest),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Manifest {
        self.state.lock().clone()
    }

    /// Baseline for `path`: its own entry, else the manifest default.
    pub fn baseline(&self, path: &DocPath) -> Option<RevisionId> {
        let state = self.state.lock();
        state
            .files
            .get(path)
            .map(|e| e.baseline_revision.clone())
            .or_else(|| state.default_baseline.clone())
    }

    pub fn default_baseline(&self) -> Option<RevisionId> {
        self.state.lock().default_baseline.clone()
    }

    pub fn entry(&self, path: &DocPath) -> Option<ManifestEntry> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn entries(&self) -> Vec<(DocPath, ManifestEntry)> {
        self.state
            .lock()
            .files
            .iter()
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect()
    }

    /// Replace the entry for `path` and persist.
    pub fn record_sync(
        &self,
        path: &DocPath,
        revision: &RevisionId,
        strategy: SyncStrategy,
        metadata: BTreeMap<String, String>,
    ) -> Result<(), SyncError> {
        let now = Utc::now();
        self.mutate(|m| {
            m.files.insert(
                path.clone(),
                ManifestEntry {
                    baseline_revision: revision.clone(),
                    strategy,
                    last_synced_at: now,
                    metadata,
                },
            );
        })?;
        tracing::debug!("manifest: {path} -> {} ({strategy})", revision.short());
        Ok(())
    }

    pub fn set_default_baseline(&self, revision: &RevisionId) -> Result<(), SyncError> {
        self.mutate(|m| m.default_baseline = Some(revision.clone()))?;
        tracing::info!("default baseline set to {}", revision.short());
        Ok(())
    }

    /// Drop the entry for `path`. Returns whether one existed.
    pub fn remove(&self, path: &DocPath) -> Result<bool, SyncError> {
        let mut existed = false;
        self.mutate(|m| existed = m.files.remove(path).is_some())?;
        Ok(existed)
    }

    pub fn summary(&self) -> ManifestSummary {
        let state = self.state.lock();
        let mut by_strategy = BTreeMap::new();
        for entry in state.files.values() {
            *by_strategy.entry(entry.strategy).or_insert(0) += 1;
        }
        ManifestSummary {
            total: state.files.len(),
            by_strategy,
            default_baseline: state.default_baseline.clone(),
            updated_at: Some(state.updated_at),
        }
    }

    fn mutate(&self, f: impl FnOnce(&mut Manifest)) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        f(&mut next);
        next.schema_version = MANIFEST_SCHEMA_VERSION;
        next.updated_at = Utc::now();
        save_at(&self.path, &next)?;
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest_path(tmp: &TempDir) -> PathBuf {
        tmp.path().join(".transync").join("manifest.json")
    }

    #[test]
    fn missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let manager = ManifestManager::open(manifest_path(&tmp));
        assert!(manager.entries().is_empty());
        assert_eq!(manager.baseline(&DocPath::from("docs/a.md")), None);
    }

    #[test]
    fn record_then_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = manifest_path(&tmp);
        let doc = DocPath::from("docs/a.md");
        {
            let manager = ManifestManager::open(&path);
            let mut meta = BTreeMap::new();
            meta.insert("model".to_string(), "mock".to_string());
            manager
                .record_sync(&doc, &RevisionId::from("abc"), SyncStrategy::Retranslate, meta)
                .unwrap();
        }
        let manager = ManifestManager::open(&path);
        let entry = manager.entry(&doc).unwrap();
        assert_eq!(entry.baseline_revision, RevisionId::from("abc"));
        assert_eq!(entry.strategy, SyncStrategy::Retranslate);
        assert_eq!(entry.metadata.get("model").map(String::as_str), Some("mock"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn record_overwrites_whole_entry() {
        let tmp = TempDir::new().unwrap();
        let manager = ManifestManager::open(manifest_path(&tmp));
        let doc = DocPath::from("docs/a.md");
        let mut meta = BTreeMap::new();
        meta.insert("note".to_string(), "first".to_string());
        manager
            .record_sync(&doc, &RevisionId::from("r1"), SyncStrategy::NewTranslation, meta)
            .unwrap();
        manager
            .record_sync(&doc, &RevisionId::from("r2"), SyncStrategy::KeepExisting, BTreeMap::new())
            .unwrap();
        let entry = manager.entry(&doc).unwrap();
        assert_eq!(entry.baseline_revision, RevisionId::from("r2"));
        assert!(entry.metadata.is_empty());
    }

    #[test]
    fn corrupt_file_degrades_to_empty() {
        let tmp = TempDir::new().unwrap();
        let path = manifest_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(load_at(&path).is_err());
        let manager = ManifestManager::open(&path);
        assert!(manager.entries().is_empty());
        assert_eq!(manager.default_baseline(), None);
    }

    #[test]
    fn legacy_single_revision_becomes_default_baseline() {
        let tmp = TempDir::new().unwrap();
        let path = manifest_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"upstream_sha":"0123456789abcdef"}"#).unwrap();

        let manager = ManifestManager::open(&path);
        assert_eq!(
            manager.baseline(&DocPath::from("docs/any.md")),
            Some(RevisionId::from("0123456789abcdef"))
        );
    }

    #[test]
    fn entry_baseline_wins_over_default() {
        let tmp = TempDir::new().unwrap();
        let manager = ManifestManager::open(manifest_path(&tmp));
        manager.set_default_baseline(&RevisionId::from("base")).unwrap();
        let doc = DocPath::from("docs/a.md");
        manager
            .record_sync(&doc, &RevisionId::from("newer"), SyncStrategy::Retranslate, BTreeMap::new())
            .unwrap();
        assert_eq!(manager.baseline(&doc), Some(RevisionId::from("newer")));
        assert_eq!(
            manager.baseline(&DocPath::from("docs/b.md")),
            Some(RevisionId::from("base"))
        );
    }

    #[test]
    fn remove_reports_presence() {
        let tmp = TempDir::new().unwrap();
        let manager = ManifestManager::open(manifest_path(&tmp));
        let doc = DocPath::from("docs/a.md");
        manager
            .record_sync(&doc, &RevisionId::from("r"), SyncStrategy::Baseline, BTreeMap::new())
            .unwrap();
        assert!(manager.remove(&doc).unwrap());
        assert!(!manager.remove(&doc).unwrap());
    }

    #[test]
    fn summary_counts_strategies() {
        let tmp = TempDir::new().unwrap();
        let manager = ManifestManager::open(manifest_path(&tmp));
        let rev = RevisionId::from("r");
        for (p, s) in [
            ("docs/a.md", SyncStrategy::Retranslate),
            ("docs/b.md", SyncStrategy::Retranslate),
            ("docs/c.md", SyncStrategy::KeepExisting),
        ] {
            manager
                .record_sync(&DocPath::from(p), &rev, s, BTreeMap::new())
                .unwrap();
        }
        let summary = manager.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_strategy[&SyncStrategy::Retranslate], 2);
        assert_eq!(summary.by_strategy[&SyncStrategy::KeepExisting], 1);
    }

    #[test]
    fn failed_write_keeps_previous_state() {
        let tmp = TempDir::new().unwrap();
        // The manifest path is a directory, so the rename cannot succeed.
        let path = tmp.path().join("manifest.json");
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let manager = ManifestManager::open(&path);
        let doc = DocPath::from("docs/a.md");
        let err = manager
            .record_sync(&doc, &RevisionId::from("r"), SyncStrategy::Retranslate, BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, SyncError::ManifestWrite { .. }), "{err:?}");
        assert!(manager.entry(&doc).is_none());
    }
}
