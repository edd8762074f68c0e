//! Domain types shared by every transync crate.
//!
//! The edit script and the action types travel between the diff, policy and
//! apply stages as typed values; JSON only appears at the CLI boundary and in
//! the on-disk manifest.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Repository-relative path of a document, identical in the upstream and the
/// translated tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocPath(pub String);

impl DocPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-cased extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.0.rsplit('/').next().unwrap_or(&self.0);
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DocPath {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocPath {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque upstream revision identifier (a commit id for git).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub String);

impl RevisionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for reports.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RevisionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RevisionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Edit script
// ---------------------------------------------------------------------------

/// Kind of a single edit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Equal,
    Insert,
    Delete,
    Replace,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Equal => write!(f, "equal"),
            OpKind::Insert => write!(f, "insert"),
            OpKind::Delete => write!(f, "delete"),
            OpKind::Replace => write!(f, "replace"),
        }
    }
}

/// Half-open line interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "inverted line range {start}..{end}");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One typed edit between an old and a new line sequence.
///
/// `old_lines` / `new_lines` are the slices of the inputs covered by the two
/// ranges. `similarity_ratio` is only present on [`OpKind::Replace`], and
/// `is_minor` is only ever true on a `Replace`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditOperation {
    pub kind: OpKind,
    pub old_range: LineRange,
    pub new_range: LineRange,
    pub old_lines: Vec<String>,
    pub new_lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_ratio: Option<f64>,
    #[serde(default)]
    pub is_minor: bool,
}

impl EditOperation {
    pub fn old_text(&self) -> String {
        self.old_lines.join("\n")
    }

    pub fn new_text(&self) -> String {
        self.new_lines.join("\n")
    }
}

/// Per-kind counters over an [`EditScript`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub equal: usize,
    pub insert: usize,
    pub delete: usize,
    pub replace: usize,
    pub minor_replace: usize,
    pub major_replace: usize,
    pub unchanged_lines: usize,
    pub added_lines: usize,
    pub removed_lines: usize,
    pub modified_lines: usize,
}

/// Ordered, immutable list of edit operations.
///
/// Built once by the diff analyzer (and re-built by the classifier); no
/// `&mut` access is handed out afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditScript {
    ops: Vec<EditOperation>,
}

impl EditScript {
    pub fn new(ops: Vec<EditOperation>) -> Self {
        Self { ops }
    }

    pub fn operations(&self) -> &[EditOperation] {
        &self.ops
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EditOperation> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Length of the old sequence this script was computed against.
    pub fn old_len(&self) -> usize {
        self.ops.last().map_or(0, |op| op.old_range.end)
    }

    /// Length of the new sequence this script was computed against.
    pub fn new_len(&self) -> usize {
        self.ops.last().map_or(0, |op| op.new_range.end)
    }

    pub fn summary(&self) -> ChangeSummary {
        let mut s = ChangeSummary::default();
        for op in &self.ops {
            match op.kind {
                OpKind::Equal => {
                    s.equal += 1;
                    s.unchanged_lines += op.old_range.len();
                }
                OpKind::Insert => {
                    s.insert += 1;
                    s.added_lines += op.new_range.len();
                }
                OpKind::Delete => {
                    s.delete += 1;
                    s.removed_lines += op.old_range.len();
                }
                OpKind::Replace => {
                    s.replace += 1;
                    s.modified_lines += op.old_range.len().max(op.new_range.len());
                    if op.is_minor {
                        s.minor_replace += 1;
                    } else {
                        s.major_replace += 1;
                    }
                }
            }
        }
        s
    }

    /// True when any insert, delete or non-minor replace is present.
    pub fn has_significant_changes(&self) -> bool {
        self.ops.iter().any(|op| match op.kind {
            OpKind::Equal => false,
            OpKind::Insert | OpKind::Delete => true,
            OpKind::Replace => !op.is_minor,
        })
    }
}

impl<'a> IntoIterator for &'a EditScript {
    type Item = &'a EditOperation;
    type IntoIter = std::slice::Iter<'a, EditOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Policy decision for one edit operation, before any translation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    KeepExisting,
    NewTranslation,
    Delete,
    Retranslate,
}

impl ActionKind {
    /// Rank used to pick a document-level strategy: higher wins.
    pub fn precedence(self) -> u8 {
        match self {
            ActionKind::KeepExisting => 0,
            ActionKind::Delete => 1,
            ActionKind::NewTranslation => 2,
            ActionKind::Retranslate => 3,
        }
    }

    /// True when resolving this action needs translated text.
    pub fn needs_translation(self) -> bool {
        matches!(self, ActionKind::NewTranslation | ActionKind::Retranslate)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::KeepExisting => write!(f, "keep_existing"),
            ActionKind::NewTranslation => write!(f, "new_translation"),
            ActionKind::Delete => write!(f, "delete"),
            ActionKind::Retranslate => write!(f, "retranslate"),
        }
    }
}

/// A resolved action, carrying translated lines where the kind needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationAction {
    KeepExisting,
    NewTranslation { lines: Vec<String> },
    Delete,
    Retranslate { lines: Vec<String> },
}

impl TranslationAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            TranslationAction::KeepExisting => ActionKind::KeepExisting,
            TranslationAction::NewTranslation { .. } => ActionKind::NewTranslation,
            TranslationAction::Delete => ActionKind::Delete,
            TranslationAction::Retranslate { .. } => ActionKind::Retranslate,
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// Current on-disk manifest schema.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Document-level strategy recorded after a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    /// First sighting: the existing translation was adopted as-is.
    Baseline,
    /// The whole document was translated from scratch.
    FullTranslation,
    KeepExisting,
    NewTranslation,
    Delete,
    Retranslate,
}

impl SyncStrategy {
    /// Collapse per-operation actions into one strategy.
    ///
    /// Precedence is retranslate, then new translation, then delete, then keep.
    pub fn overall<I>(actions: I) -> SyncStrategy
    where
        I: IntoIterator<Item = ActionKind>,
    {
        actions
            .into_iter()
            .max_by_key(|a| a.precedence())
            .map(SyncStrategy::from)
            .unwrap_or(SyncStrategy::KeepExisting)
    }
}

impl From<ActionKind> for SyncStrategy {
    fn from(kind: ActionKind) -> Self {
        match kind {
            ActionKind::KeepExisting => SyncStrategy::KeepExisting,
            ActionKind::NewTranslation => SyncStrategy::NewTranslation,
            ActionKind::Delete => SyncStrategy::Delete,
            ActionKind::Retranslate => SyncStrategy::Retranslate,
        }
    }
}

impl fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStrategy::Baseline => "baseline",
            SyncStrategy::FullTranslation => "full_translation",
            SyncStrategy::KeepExisting => "keep_existing",
            SyncStrategy::NewTranslation => "new_translation",
            SyncStrategy::Delete => "delete",
            SyncStrategy::Retranslate => "retranslate",
        };
        f.write_str(s)
    }
}

/// Per-document manifest record. Overwritten whole on every sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub baseline_revision: RevisionId,
    pub strategy: SyncStrategy,
    pub last_synced_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Root of the JSON manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    /// Baseline for documents without their own entry (set by the initial run).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_baseline: Option<RevisionId>,
    #[serde(default)]
    pub files: BTreeMap<DocPath, ManifestEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            schema_version: MANIFEST_SCHEMA_VERSION,
            updated_at: Utc::now(),
            default_baseline: None,
            files: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: OpKind, old: (usize, usize), new: (usize, usize), minor: bool) -> EditOperation {
        EditOperation {
            kind,
            old_range: LineRange::new(old.0, old.1),
            new_range: LineRange::new(new.0, new.1),
            old_lines: vec![String::new(); old.1 - old.0],
            new_lines: vec![String::new(); new.1 - new.0],
            similarity_ratio: (kind == OpKind::Replace).then_some(0.5),
            is_minor: minor,
        }
    }

    #[test]
    fn newtype_display() {
        assert_eq!(DocPath::from("docs/a.md").to_string(), "docs/a.md");
        assert_eq!(RevisionId::from("abc").to_string(), "abc");
    }

    #[test]
    fn revision_short_truncates() {
        assert_eq!(RevisionId::from("0123456789abcdef").short(), "01234567");
        assert_eq!(RevisionId::from("abc").short(), "abc");
    }

    #[test]
    fn doc_path_extension() {
        assert_eq!(DocPath::from("docs/Guide.MD").extension().as_deref(), Some("md"));
        assert_eq!(DocPath::from("docs/.hidden").extension(), None);
        assert_eq!(DocPath::from("docs/README").extension(), None);
        assert_eq!(DocPath::from("a.b/c").extension(), None);
    }

    #[test]
    fn summary_counts_lines_by_kind() {
        let script = EditScript::new(vec![
            op(OpKind::Equal, (0, 2), (0, 2), false),
            op(OpKind::Replace, (2, 3), (2, 3), true),
            op(OpKind::Insert, (3, 3), (3, 5), false),
            op(OpKind::Replace, (3, 4), (5, 7), false),
            op(OpKind::Delete, (4, 6), (7, 7), false),
        ]);
        let s = script.summary();
        assert_eq!(s.equal, 1);
        assert_eq!(s.replace, 2);
        assert_eq!(s.minor_replace, 1);
        assert_eq!(s.major_replace, 1);
        assert_eq!(s.unchanged_lines, 2);
        assert_eq!(s.added_lines, 2);
        assert_eq!(s.removed_lines, 2);
        assert_eq!(s.modified_lines, 3);
        assert_eq!(script.old_len(), 6);
        assert_eq!(script.new_len(), 7);
    }

    #[test]
    fn minor_only_script_is_not_significant() {
        let script = EditScript::new(vec![
            op(OpKind::Equal, (0, 1), (0, 1), false),
            op(OpKind::Replace, (1, 2), (1, 2), true),
        ]);
        assert!(!script.has_significant_changes());

        let script = EditScript::new(vec![op(OpKind::Insert, (0, 0), (0, 1), false)]);
        assert!(script.has_significant_changes());
    }

    #[test]
    fn overall_strategy_precedence() {
        use ActionKind::*;
        assert_eq!(
            SyncStrategy::overall([KeepExisting, Delete, NewTranslation]),
            SyncStrategy::NewTranslation
        );
        assert_eq!(
            SyncStrategy::overall([Delete, Retranslate, NewTranslation]),
            SyncStrategy::Retranslate
        );
        assert_eq!(SyncStrategy::overall([KeepExisting, Delete]), SyncStrategy::Delete);
        assert_eq!(SyncStrategy::overall([]), SyncStrategy::KeepExisting);
    }

    #[test]
    fn action_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ActionKind::KeepExisting).unwrap();
        assert_eq!(json, "\"keep_existing\"");
        let json = serde_json::to_string(&OpKind::Replace).unwrap();
        assert_eq!(json, "\"replace\"");
    }

    #[test]
    fn manifest_serde_roundtrip_with_path_keys() {
        let mut manifest = Manifest::default();
        manifest.files.insert(
            DocPath::from("docs/a.md"),
            ManifestEntry {
                baseline_revision: RevisionId::from("r1"),
                strategy: SyncStrategy::Retranslate,
                last_synced_at: Utc::now(),
                metadata: BTreeMap::new(),
            },
        );
        let json = serde_json::to_string_pretty(&manifest).expect("serialize");
        assert!(json.contains("\"docs/a.md\""));
        let back: Manifest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, manifest);
    }

    #[test]
    fn translation_action_kind() {
        let a = TranslationAction::Retranslate {
            lines: vec!["x".into()],
        };
        assert_eq!(a.kind(), ActionKind::Retranslate);
        assert!(a.kind().needs_translation());
        assert!(!TranslationAction::Delete.kind().needs_translation());
    }
}
