//! Discover → apply sync pipeline shared by every CLI command.
//!
//! [`SyncEngine::discover`] finds documents whose upstream changed since
//! their baseline and plans them (diff, classify, decide) without touching
//! the translated tree. [`SyncEngine::apply_report`] and [`run_batch`]
//! execute a plan: resolve actions, rewrite, write atomically, then record
//! the new baseline. A failing document is reported and never aborts the
//! batch.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};

use transync_core::{
    ActionKind, ChangeSummary, Config, DocPath, EditScript, RevisionId, SyncStrategy,
};

use crate::apply::apply;
use crate::cache::{CacheStats, TranslationCache};
use crate::classify::ChangeClassifier;
use crate::diff::{join_lines, new_side, split_lines, LineDiffAnalyzer};
use crate::error::{io_err, SyncError};
use crate::filters::PathFilter;
use crate::manifest::ManifestManager;
use crate::oracle::SemanticChangeOracle;
use crate::policy::{DocumentContext, PolicyEngine, PolicyStats};
use crate::postprocess::postprocess;
use crate::vcs::{ChangeStatus, VersionControl};
use crate::writer::{restore_document, snapshot_document, write_document, WriteResult};
use transync_llm::TranslationService;

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// What to discover.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryRequest {
    /// Target revision; the configured upstream tracking ref when `None`.
    pub target: Option<String>,
    /// Restrict discovery to these documents. Empty means all.
    pub paths: Vec<DocPath>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Patch the existing translation with the edit script.
    Incremental,
    /// Translate the whole upstream document.
    FullTranslation,
    /// First run: take the existing translation as the baseline.
    Adopt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPlan {
    pub path: DocPath,
    pub mode: PlanMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_revision: Option<RevisionId>,
    pub strategy: SyncStrategy,
    pub summary: ChangeSummary,
    /// Whether the upstream document ends with a newline.
    pub trailing_newline: bool,
    pub script: EditScript,
    pub actions: Vec<ActionKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub path: DocPath,
    pub reason: String,
}

/// Output of `discover`, input of `apply`. This is the JSON exchanged
/// between the two CLI commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub target_revision: RevisionId,
    pub is_initial: bool,
    /// False when discovery was restricted to some paths; the default
    /// baseline is then left where it is.
    pub complete: bool,
    pub generated_at: DateTime<Utc>,
    pub documents: Vec<DocumentPlan>,
    #[serde(default)]
    pub skipped: Vec<SkippedDocument>,
    /// Documents that could not be planned. Applying the report carries them
    /// over as failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<DocumentFailure>,
}

impl DiscoveryReport {
    pub fn is_up_to_date(&self) -> bool {
        self.documents.is_empty() && self.skipped.is_empty() && self.failures.is_empty()
    }

    fn plan_or_fail(&mut self, path: DocPath, planned: Result<DocumentPlan, SyncError>) {
        match planned {
            Ok(plan) => self.documents.push(plan),
            Err(e) => {
                tracing::error!("{path}: cannot plan ({e})");
                self.failures.push(DocumentFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentReport {
    pub path: DocPath,
    pub strategy: SyncStrategy,
    /// `None` when nothing was written (adopted baselines).
    pub write: Option<WriteResult>,
    pub summary: ChangeSummary,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub path: DocPath,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub target_revision: RevisionId,
    pub dry_run: bool,
    pub documents: Vec<DocumentReport>,
    pub failures: Vec<DocumentFailure>,
    pub skipped: Vec<SkippedDocument>,
    pub baseline_advanced: bool,
    pub policy: PolicyStats,
    pub cache: CacheStats,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Every collaborator of a sync run, injected.
pub struct SyncEngine {
    root: PathBuf,
    config: Config,
    vcs: Arc<dyn VersionControl>,
    manifest: Arc<ManifestManager>,
    policy: Arc<PolicyEngine>,
    analyzer: LineDiffAnalyzer,
    filter: PathFilter,
}

impl SyncEngine {
    /// Open the manifest and cache named by `config` under `root`.
    pub fn open(
        root: &Path,
        config: Config,
        vcs: Arc<dyn VersionControl>,
        translator: Arc<dyn TranslationService>,
        oracle: Arc<dyn SemanticChangeOracle>,
    ) -> Result<Self, SyncError> {
        let manifest = Arc::new(ManifestManager::open(config.manifest_path_at(root)));
        let cache = Arc::new(TranslationCache::open_or_degrade(&config.cache_path_at(root))?);
        let policy = Arc::new(PolicyEngine::new(oracle, cache, translator));
        Ok(Self::with_parts(root, config, vcs, manifest, policy))
    }

    pub fn with_parts(
        root: &Path,
        config: Config,
        vcs: Arc<dyn VersionControl>,
        manifest: Arc<ManifestManager>,
        policy: Arc<PolicyEngine>,
    ) -> Self {
        let analyzer = LineDiffAnalyzer::with_timeout(
            config.classifier.diff_timeout_ms.map(Duration::from_millis),
        );
        let filter = PathFilter::new(&config.filters);
        Self {
            root: root.to_path_buf(),
            config,
            vcs,
            manifest,
            policy,
            analyzer,
            filter,
        }
    }

    pub fn manifest(&self) -> &Arc<ManifestManager> {
        &self.manifest
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn translated_path(&self, path: &DocPath) -> PathBuf {
        self.config.translated_root_at(&self.root).join(path.as_str())
    }

    fn classifier_for(&self, path: &DocPath) -> ChangeClassifier {
        ChangeClassifier::new(self.config.classifier.thresholds_for(path))
    }

    fn read_upstream(&self, path: &DocPath, rev: &RevisionId) -> Result<String, SyncError> {
        self.vcs
            .read_file_at(path, rev)?
            .ok_or_else(|| SyncError::MissingUpstream {
                path: path.clone(),
                revision: rev.clone(),
            })
    }

    // -- discover ----------------------------------------------------------

    pub fn discover(&self, request: &DiscoveryRequest) -> Result<DiscoveryReport, SyncError> {
        let target_ref = request
            .target
            .clone()
            .unwrap_or_else(|| self.config.upstream.tracking_ref());
        let target = self.vcs.resolve(&target_ref)?;
        let snapshot = self.manifest.snapshot();
        let is_initial = snapshot.default_baseline.is_none() && snapshot.files.is_empty();
        let wanted = |p: &DocPath| request.paths.is_empty() || request.paths.contains(p);

        let mut report = DiscoveryReport {
            target_revision: target.clone(),
            is_initial,
            complete: request.paths.is_empty(),
            generated_at: Utc::now(),
            documents: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        };
        let mut seen = BTreeSet::new();

        if is_initial {
            tracing::info!("no baseline recorded; initial run at {}", target.short());
        } else {
            let baselines: BTreeSet<RevisionId> = snapshot
                .files
                .values()
                .map(|e| e.baseline_revision.clone())
                .chain(snapshot.default_baseline.clone())
                .filter(|b| *b != target)
                .collect();

            for baseline in &baselines {
                let changes = self.vcs.changed_paths(baseline, &target)?;
                tracing::debug!(
                    "{} path(s) changed {}..{}",
                    changes.len(),
                    baseline.short(),
                    target.short()
                );
                for change in changes {
                    let path = change.path;
                    if !self.filter.is_translatable(&path) || !wanted(&path) {
                        continue;
                    }
                    if self.manifest.baseline(&path).as_ref() != Some(baseline) {
                        continue;
                    }
                    seen.insert(path.clone());
                    if change.status == ChangeStatus::Deleted {
                        report.skipped.push(SkippedDocument {
                            path,
                            reason: "deleted upstream".to_string(),
                        });
                        continue;
                    }
                    let planned =
                        self.plan_document(path.clone(), baseline, &target, change.status);
                    report.plan_or_fail(path, planned);
                }
            }
        }

        // Documents without a translation yet, whatever their history.
        for path in self.vcs.list_files_at(&target)? {
            if seen.contains(&path) || !self.filter.is_translatable(&path) || !wanted(&path) {
                continue;
            }
            let exists = self.translated_path(&path).exists();
            if is_initial && exists {
                report.documents.push(adopt_plan(path));
            } else if !exists {
                let baseline = self.manifest.baseline(&path);
                let planned = self.read_upstream(&path, &target).map(|content| {
                    self.full_plan(path.clone(), baseline, None, &content, Vec::new())
                });
                report.plan_or_fail(path, planned);
            }
        }

        report.documents.sort_by(|a, b| a.path.cmp(&b.path));
        report.skipped.sort_by(|a, b| a.path.cmp(&b.path));
        report.failures.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!(
            "discovered {} document(s), {} skipped, {} failed, target {}",
            report.documents.len(),
            report.skipped.len(),
            report.failures.len(),
            target.short()
        );
        Ok(report)
    }

    fn plan_document(
        &self,
        path: DocPath,
        baseline: &RevisionId,
        target: &RevisionId,
        status: ChangeStatus,
    ) -> Result<DocumentPlan, SyncError> {
        let new_content = self.read_upstream(&path, target)?;
        let translated = self.translated_path(&path);
        let existing = match std::fs::read_to_string(&translated) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Ok(self.full_plan(
                    path,
                    Some(baseline.clone()),
                    Some(status),
                    &new_content,
                    Vec::new(),
                ));
            }
            Err(e) => return Err(io_err(translated, e)),
        };
        let Some(old_content) = self.vcs.read_file_at(&path, baseline)? else {
            let note = format!(
                "not present upstream at baseline {}; translating the whole document",
                baseline.short()
            );
            return Ok(self.full_plan(
                path,
                Some(baseline.clone()),
                Some(status),
                &new_content,
                vec![note],
            ));
        };

        let old = split_lines(&old_content);
        let new = split_lines(&new_content);
        let script = self
            .classifier_for(&path)
            .classify_script(self.analyzer.analyze(&old, &new));
        let actions = self.policy.decide_all(&path, &script);
        let strategy = SyncStrategy::overall(actions.iter().copied());

        let mut warnings = Vec::new();
        let existing_len = split_lines(&existing).len();
        if existing_len != old.len() {
            warnings.push(format!(
                "translation has {existing_len} lines but upstream at baseline has {}",
                old.len()
            ));
        }

        Ok(DocumentPlan {
            path,
            mode: PlanMode::Incremental,
            change: Some(status),
            baseline_revision: Some(baseline.clone()),
            strategy,
            summary: script.summary(),
            trailing_newline: new_content.ends_with('\n'),
            script,
            actions,
            warnings,
        })
    }

    fn full_plan(
        &self,
        path: DocPath,
        baseline: Option<RevisionId>,
        change: Option<ChangeStatus>,
        content: &str,
        warnings: Vec<String>,
    ) -> DocumentPlan {
        let new = split_lines(content);
        let script = self.analyzer.analyze(&Vec::<String>::new(), &new);
        let actions = self.policy.decide_all(&path, &script);
        DocumentPlan {
            path,
            mode: PlanMode::FullTranslation,
            change,
            baseline_revision: baseline,
            strategy: SyncStrategy::FullTranslation,
            summary: script.summary(),
            trailing_newline: content.ends_with('\n'),
            script,
            actions,
            warnings,
        }
    }

    // -- apply -------------------------------------------------------------

    /// Execute one plan. On error the translated file is left as it was: a
    /// manifest write that fails after the file write restores the file.
    pub fn apply_document(
        &self,
        plan: &DocumentPlan,
        target: &RevisionId,
        dry_run: bool,
    ) -> Result<DocumentReport, SyncError> {
        if plan.mode == PlanMode::Adopt {
            if !dry_run {
                self.manifest
                    .record_sync(&plan.path, target, SyncStrategy::Baseline, BTreeMap::new())?;
            }
            return Ok(DocumentReport {
                path: plan.path.clone(),
                strategy: SyncStrategy::Baseline,
                write: None,
                summary: plan.summary.clone(),
                warnings: plan.warnings.clone(),
            });
        }

        let translated = self.translated_path(&plan.path);
        let new_lines = new_side(&plan.script);
        let mut warnings = plan.warnings.clone();

        let current = match plan.mode {
            PlanMode::Incremental => match std::fs::read_to_string(&translated) {
                Ok(text) => Some(text),
                Err(e) if e.kind() == ErrorKind::NotFound => None,
                Err(e) => return Err(io_err(&translated, e)),
            },
            _ => None,
        };

        let (script, kinds, strategy, existing, trailing_newline) = match current {
            Some(text) => (
                plan.script.clone(),
                plan.actions.clone(),
                plan.strategy,
                split_lines(&text),
                text.ends_with('\n'),
            ),
            None => {
                if plan.mode == PlanMode::Incremental {
                    warnings.push("translation disappeared; translating the whole document".into());
                }
                let script = self.analyzer.analyze(&Vec::<String>::new(), &new_lines);
                let kinds = self.policy.decide_all(&plan.path, &script);
                (
                    script,
                    kinds,
                    SyncStrategy::FullTranslation,
                    Vec::new(),
                    plan.trailing_newline,
                )
            }
        };

        let cache_revision = plan
            .baseline_revision
            .clone()
            .unwrap_or_else(|| target.clone());
        let ctx = DocumentContext::new(plan.path.clone(), cache_revision, &new_lines);
        let resolved = self.policy.resolve_all(&script, &kinds, &ctx)?;
        let rewritten = apply(&existing, &script, &resolved)?;

        let processed = postprocess(rewritten, new_lines.len());
        for w in &processed.warnings {
            tracing::warn!("{}: {w}", plan.path);
        }
        warnings.extend(processed.warnings);

        let content = join_lines(&processed.lines, trailing_newline);
        let previous = if dry_run {
            None
        } else {
            snapshot_document(&translated)?
        };
        let write = write_document(&translated, &content, dry_run)?;

        if !dry_run {
            let summary = script.summary();
            let mut metadata = BTreeMap::new();
            metadata.insert("added_lines".to_string(), summary.added_lines.to_string());
            metadata.insert("removed_lines".to_string(), summary.removed_lines.to_string());
            metadata.insert("modified_lines".to_string(), summary.modified_lines.to_string());
            if let Err(e) = self
                .manifest
                .record_sync(&plan.path, target, strategy, metadata)
            {
                // The baseline did not move, so the file must not either.
                if matches!(write, WriteResult::Written { .. }) {
                    if let Err(restore) = restore_document(&translated, previous.as_deref()) {
                        tracing::error!(
                            "{}: could not restore {} ({restore})",
                            plan.path,
                            translated.display()
                        );
                    }
                }
                return Err(e);
            }
        }

        tracing::info!("{}: {strategy}", plan.path);
        Ok(DocumentReport {
            path: plan.path.clone(),
            strategy,
            write: Some(write),
            summary: script.summary(),
            warnings,
        })
    }

    /// Apply every plan in `report`, one document at a time.
    pub fn apply_report(
        &self,
        report: &DiscoveryReport,
        dry_run: bool,
    ) -> Result<BatchReport, SyncError> {
        let mut documents = Vec::new();
        let mut failures = Vec::new();
        for plan in &report.documents {
            match self.apply_document(plan, &report.target_revision, dry_run) {
                Ok(doc) => documents.push(doc),
                Err(e) => {
                    tracing::error!("{}: {e}", plan.path);
                    failures.push(DocumentFailure {
                        path: plan.path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        self.finish(report, dry_run, documents, failures)
    }

    /// Discover and apply in one go.
    pub fn sync(&self, request: &DiscoveryRequest, dry_run: bool) -> Result<BatchReport, SyncError> {
        let report = self.discover(request)?;
        self.apply_report(&report, dry_run)
    }

    fn finish(
        &self,
        report: &DiscoveryReport,
        dry_run: bool,
        mut documents: Vec<DocumentReport>,
        mut failures: Vec<DocumentFailure>,
    ) -> Result<BatchReport, SyncError> {
        failures.extend(report.failures.iter().cloned());
        documents.sort_by(|a, b| a.path.cmp(&b.path));
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let advance = !dry_run
            && failures.is_empty()
            && report.complete
            && (report.is_initial || self.manifest.default_baseline().is_some());
        if advance {
            self.manifest.set_default_baseline(&report.target_revision)?;
        }

        Ok(BatchReport {
            target_revision: report.target_revision.clone(),
            dry_run,
            documents,
            failures,
            skipped: report.skipped.clone(),
            baseline_advanced: advance,
            policy: self.policy.stats(),
            cache: self.policy.cache().stats(),
        })
    }
}

fn adopt_plan(path: DocPath) -> DocumentPlan {
    DocumentPlan {
        path,
        mode: PlanMode::Adopt,
        change: None,
        baseline_revision: None,
        strategy: SyncStrategy::Baseline,
        summary: ChangeSummary::default(),
        trailing_newline: true,
        script: EditScript::default(),
        actions: Vec::new(),
        warnings: Vec::new(),
    }
}

/// Apply `report` with up to `jobs` documents in flight.
///
/// Each document runs on the blocking pool; the translation service's own
/// admission gate still bounds outbound calls. A worker that panics is
/// reported as that document's failure. Document order in the result is by
/// path.
pub async fn run_batch(
    engine: Arc<SyncEngine>,
    report: DiscoveryReport,
    dry_run: bool,
    jobs: usize,
) -> Result<BatchReport, SyncError> {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let report = Arc::new(report);
    let mut set = JoinSet::new();
    let mut in_flight: HashMap<task::Id, DocPath> = HashMap::new();

    for index in 0..report.documents.len() {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| SyncError::Task(e.to_string()))?;
        let engine = Arc::clone(&engine);
        let shared = Arc::clone(&report);
        let handle = set.spawn_blocking(move || {
            let _permit = permit;
            let plan = &shared.documents[index];
            let result = engine.apply_document(plan, &shared.target_revision, dry_run);
            (plan.path.clone(), result)
        });
        in_flight.insert(handle.id(), report.documents[index].path.clone());
    }

    let mut documents = Vec::new();
    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (path, result) = match joined {
            Ok(done) => done,
            Err(e) => {
                let Some(path) = in_flight.remove(&e.id()) else {
                    return Err(SyncError::Task(e.to_string()));
                };
                (path, Err(SyncError::Task(e.to_string())))
            }
        };
        match result {
            Ok(doc) => documents.push(doc),
            Err(e) => {
                tracing::error!("{path}: {e}");
                failures.push(DocumentFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    engine.finish(&report, dry_run, documents, failures)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::HeuristicOracle;
    use crate::vcs::InMemoryVcs;
    use tempfile::TempDir;
    use transync_llm::MockTranslator;

    struct Fixture {
        tmp: TempDir,
        mock: Arc<MockTranslator>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tmp: TempDir::new().unwrap(),
                mock: Arc::new(MockTranslator::default()),
            }
        }

        fn engine(&self, vcs: InMemoryVcs) -> SyncEngine {
            SyncEngine::open(
                self.tmp.path(),
                Config::default(),
                Arc::new(vcs),
                self.mock.clone(),
                Arc::new(HeuristicOracle),
            )
            .unwrap()
        }

        fn write(&self, rel: &str, content: &str) {
            let path = self.tmp.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        fn read(&self, rel: &str) -> String {
            std::fs::read_to_string(self.tmp.path().join(rel)).unwrap()
        }
    }

    fn request(target: &str) -> DiscoveryRequest {
        DiscoveryRequest {
            target: Some(target.to_string()),
            paths: Vec::new(),
        }
    }

    #[test]
    fn initial_run_adopts_existing_and_translates_missing() {
        let fx = Fixture::new();
        fx.write("docs/a.md", "こんにちは\n");
        let vcs = InMemoryVcs::new().with_revision(
            "r1",
            [
                ("docs/a.md", "Hello\n"),
                ("docs/b.md", "World\n"),
                ("README.md", "root readme\n"),
            ],
        );
        let engine = fx.engine(vcs);

        let report = engine.discover(&request("r1")).unwrap();
        assert!(report.is_initial);
        let modes: Vec<(&str, PlanMode)> = report
            .documents
            .iter()
            .map(|d| (d.path.as_str(), d.mode))
            .collect();
        assert_eq!(
            modes,
            vec![
                ("docs/a.md", PlanMode::Adopt),
                ("docs/b.md", PlanMode::FullTranslation)
            ]
        );

        let batch = engine.apply_report(&report, false).unwrap();
        assert!(batch.is_success());
        assert!(batch.baseline_advanced);
        assert_eq!(fx.read("docs/a.md"), "こんにちは\n");
        assert_eq!(fx.read("docs/b.md"), "[ja] World\n");
        assert_eq!(
            engine.manifest().default_baseline(),
            Some(RevisionId::from("r1"))
        );
        assert_eq!(
            engine.manifest().entry(&DocPath::from("docs/a.md")).unwrap().strategy,
            SyncStrategy::Baseline
        );
    }

    #[test]
    fn dry_run_writes_nothing() {
        let fx = Fixture::new();
        let vcs = InMemoryVcs::new().with_revision("r1", [("docs/b.md", "World\n")]);
        let engine = fx.engine(vcs);
        let batch = engine.sync(&request("r1"), true).unwrap();
        assert!(batch.dry_run);
        assert!(!batch.baseline_advanced);
        assert!(matches!(
            batch.documents[0].write,
            Some(WriteResult::WouldWrite { .. })
        ));
        assert!(!fx.tmp.path().join("docs/b.md").exists());
        assert_eq!(engine.manifest().default_baseline(), None);
    }

    #[test]
    fn incremental_run_patches_only_changed_lines() {
        let fx = Fixture::new();
        fx.write("docs/a.md", "# タイトル\n\n既存の段落。\n");
        let vcs = InMemoryVcs::new()
            .with_revision("r1", [("docs/a.md", "# Title\n\nExisting paragraph.\n")])
            .with_revision(
                "r2",
                [(
                    "docs/a.md",
                    "# Title\n\nExisting paragraph.\n\nA brand new paragraph.\n",
                )],
            );
        let engine = fx.engine(vcs);
        engine
            .manifest()
            .set_default_baseline(&RevisionId::from("r1"))
            .unwrap();

        let report = engine.discover(&request("r2")).unwrap();
        assert!(!report.is_initial);
        assert_eq!(report.documents.len(), 1);
        let plan = &report.documents[0];
        assert_eq!(plan.mode, PlanMode::Incremental);
        assert_eq!(plan.strategy, SyncStrategy::NewTranslation);

        let batch = engine.apply_report(&report, false).unwrap();
        assert!(batch.is_success(), "{:?}", batch.failures);
        assert_eq!(
            fx.read("docs/a.md"),
            "# タイトル\n\n既存の段落。\n\n[ja] A brand new paragraph.\n"
        );
        assert_eq!(fx.mock.translate_calls(), 1);
        assert!(batch.baseline_advanced);
        let entry = engine.manifest().entry(&DocPath::from("docs/a.md")).unwrap();
        assert_eq!(entry.baseline_revision, RevisionId::from("r2"));
    }

    #[test]
    fn upstream_deletion_is_skipped_and_manifest_untouched() {
        let fx = Fixture::new();
        fx.write("docs/a.md", "訳\n");
        let vcs = InMemoryVcs::new()
            .with_revision("r1", [("docs/a.md", "text\n")])
            .with_revision("r2", Vec::<(&str, &str)>::new());
        let engine = fx.engine(vcs);
        let doc = DocPath::from("docs/a.md");
        engine
            .manifest()
            .record_sync(&doc, &RevisionId::from("r1"), SyncStrategy::Baseline, BTreeMap::new())
            .unwrap();

        let report = engine.discover(&request("r2")).unwrap();
        assert!(report.documents.is_empty());
        assert_eq!(report.skipped[0].reason, "deleted upstream");
        let batch = engine.apply_report(&report, false).unwrap();
        assert!(batch.is_success());
        assert_eq!(
            engine.manifest().entry(&doc).unwrap().baseline_revision,
            RevisionId::from("r1")
        );
        assert_eq!(fx.read("docs/a.md"), "訳\n");
    }

    #[test]
    fn path_filter_keeps_default_baseline() {
        let fx = Fixture::new();
        fx.write("docs/a.md", "A\n");
        fx.write("docs/b.md", "B\n");
        let vcs = InMemoryVcs::new()
            .with_revision("r1", [("docs/a.md", "a\n"), ("docs/b.md", "b\n")])
            .with_revision("r2", [("docs/a.md", "a\nmore\n"), ("docs/b.md", "b\nmore\n")]);
        let engine = fx.engine(vcs);
        engine
            .manifest()
            .set_default_baseline(&RevisionId::from("r1"))
            .unwrap();

        let req = DiscoveryRequest {
            target: Some("r2".to_string()),
            paths: vec![DocPath::from("docs/a.md")],
        };
        let report = engine.discover(&req).unwrap();
        assert!(!report.complete);
        assert_eq!(report.documents.len(), 1);
        let batch = engine.apply_report(&report, false).unwrap();
        assert!(!batch.baseline_advanced);
        assert_eq!(engine.manifest().default_baseline(), Some(RevisionId::from("r1")));
        assert_eq!(
            engine.manifest().baseline(&DocPath::from("docs/a.md")),
            Some(RevisionId::from("r2"))
        );
    }

    #[test]
    fn up_to_date_when_target_equals_baseline() {
        let fx = Fixture::new();
        fx.write("docs/a.md", "A\n");
        let vcs = InMemoryVcs::new().with_revision("r1", [("docs/a.md", "a\n")]);
        let engine = fx.engine(vcs);
        engine
            .manifest()
            .set_default_baseline(&RevisionId::from("r1"))
            .unwrap();
        let report = engine.discover(&request("r1")).unwrap();
        assert!(report.is_up_to_date());
    }

    #[test]
    fn discovery_report_survives_json() {
        let fx = Fixture::new();
        let vcs = InMemoryVcs::new().with_revision("r1", [("docs/b.md", "World\n")]);
        let engine = fx.engine(vcs);
        let report = engine.discover(&request("r1")).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let back: DiscoveryReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }

    #[test]
    fn failed_manifest_write_restores_translation() {
        let fx = Fixture::new();
        fx.write("docs/a.md", "序文。\n");
        let vcs = InMemoryVcs::new()
            .with_revision("r1", [("docs/a.md", "Intro.\n")])
            .with_revision("r2", [("docs/a.md", "Intro.\nA new sentence.\n")]);
        let engine = fx.engine(vcs);
        engine
            .manifest()
            .set_default_baseline(&RevisionId::from("r1"))
            .unwrap();
        let manifest_path = engine.manifest().path().to_path_buf();
        std::fs::remove_file(&manifest_path).unwrap();
        std::fs::create_dir_all(&manifest_path).unwrap();

        let batch = engine.sync(&request("r2"), false).unwrap();
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures[0].reason.contains("manifest"), "{}", batch.failures[0].reason);
        assert_eq!(fx.read("docs/a.md"), "序文。\n");
        assert!(!batch.baseline_advanced);

        std::fs::remove_dir(&manifest_path).unwrap();
        let batch = engine.sync(&request("r2"), false).unwrap();
        assert!(batch.is_success(), "{:?}", batch.failures);
        assert_eq!(fx.read("docs/a.md"), "序文。\n[ja] A new sentence.\n");
    }

    #[test]
    fn unreadable_translation_fails_alone() {
        let fx = Fixture::new();
        let broken = fx.tmp.path().join("docs/a.md");
        std::fs::create_dir_all(broken.parent().unwrap()).unwrap();
        std::fs::write(&broken, b"\xff\xfe broken\n").unwrap();
        fx.write("docs/b.md", "B\n");
        let vcs = InMemoryVcs::new()
            .with_revision("r1", [("docs/a.md", "a\n"), ("docs/b.md", "b\n")])
            .with_revision("r2", [("docs/a.md", "a\nmore\n"), ("docs/b.md", "b\nmore\n")]);
        let engine = fx.engine(vcs);
        engine
            .manifest()
            .set_default_baseline(&RevisionId::from("r1"))
            .unwrap();

        let report = engine.discover(&request("r2")).unwrap();
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].path, DocPath::from("docs/a.md"));
        assert!(!report.is_up_to_date());

        let batch = engine.apply_report(&report, false).unwrap();
        assert!(!batch.is_success());
        assert_eq!(batch.failures[0].path, DocPath::from("docs/a.md"));
        assert_eq!(fx.read("docs/b.md"), "B\n[ja] more\n");
        assert_eq!(std::fs::read(&broken).unwrap(), b"\xff\xfe broken\n");
        assert!(!batch.baseline_advanced);
        assert_eq!(engine.manifest().default_baseline(), Some(RevisionId::from("r1")));
        assert!(engine.manifest().entry(&DocPath::from("docs/a.md")).is_none());
    }
}
