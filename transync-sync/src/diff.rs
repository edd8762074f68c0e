//! Line-level diff analysis.
//!
//! [`LineDiffAnalyzer::analyze`] aligns two line sequences with Myers' LCS
//! alignment and returns an [`EditScript`] whose operations are contiguous,
//! strictly increasing, and jointly cover both inputs. Every gap between two
//! runs of equal lines becomes exactly one operation: `Insert` when only new
//! lines are present, `Delete` when only old lines are, `Replace` otherwise.

use std::ops::Range;
use std::time::{Duration, Instant};

use similar::{capture_diff_slices_deadline, Algorithm, DiffTag, TextDiff};

use transync_core::{EditOperation, EditScript, LineRange, OpKind};

#[derive(Debug, Clone, Default)]
pub struct LineDiffAnalyzer {
    timeout: Option<Duration>,
}

impl LineDiffAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound alignment time. Past the deadline the alignment gets coarser
    /// (larger replace blocks) but the script stays valid.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn analyze<S: AsRef<str>>(&self, old: &[S], new: &[S]) -> EditScript {
        let old: Vec<&str> = old.iter().map(AsRef::as_ref).collect();
        let new: Vec<&str> = new.iter().map(AsRef::as_ref).collect();
        if old.is_empty() && new.is_empty() {
            return EditScript::default();
        }

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let raw = capture_diff_slices_deadline(Algorithm::Myers, &old, &new, deadline);

        let mut ops = Vec::new();
        let mut pending: Option<(Range<usize>, Range<usize>)> = None;
        let mut equal: Option<(Range<usize>, Range<usize>)> = None;

        for op in &raw {
            let (tag, o, n) = op.as_tag_tuple();
            if tag == DiffTag::Equal {
                if o.is_empty() {
                    continue;
                }
                if let Some((po, pn)) = pending.take() {
                    ops.push(build(change_kind(&po, &pn), po, pn, &old, &new));
                }
                equal = Some(match equal.take() {
                    Some((eo, en)) => (eo.start..o.end, en.start..n.end),
                    None => (o, n),
                });
            } else {
                if o.is_empty() && n.is_empty() {
                    continue;
                }
                if let Some((eo, en)) = equal.take() {
                    ops.push(build(OpKind::Equal, eo, en, &old, &new));
                }
                pending = Some(match pending.take() {
                    Some((po, pn)) => (po.start..o.end, pn.start..n.end),
                    None => (o, n),
                });
            }
        }
        if let Some((eo, en)) = equal.take() {
            ops.push(build(OpKind::Equal, eo, en, &old, &new));
        }
        if let Some((po, pn)) = pending.take() {
            ops.push(build(change_kind(&po, &pn), po, pn, &old, &new));
        }

        EditScript::new(ops)
    }

    /// Split both texts into lines (CRLF-normalised) and analyze them.
    pub fn analyze_text(&self, old: &str, new: &str) -> EditScript {
        self.analyze(&split_lines(old), &split_lines(new))
    }
}

fn change_kind(old: &Range<usize>, new: &Range<usize>) -> OpKind {
    match (old.is_empty(), new.is_empty()) {
        (true, _) => OpKind::Insert,
        (_, true) => OpKind::Delete,
        _ => OpKind::Replace,
    }
}

fn build(
    kind: OpKind,
    o: Range<usize>,
    n: Range<usize>,
    old: &[&str],
    new: &[&str],
) -> EditOperation {
    EditOperation {
        kind,
        old_range: LineRange::new(o.start, o.end),
        new_range: LineRange::new(n.start, n.end),
        old_lines: old[o].iter().map(|s| s.to_string()).collect(),
        new_lines: new[n].iter().map(|s| s.to_string()).collect(),
        similarity_ratio: None,
        is_minor: false,
    }
}

/// Lines of `text` with `\r\n` normalised; a trailing newline adds no line.
pub fn split_lines(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .lines()
        .map(str::to_string)
        .collect()
}

/// Join lines back into a document body.
pub fn join_lines<S: AsRef<str>>(lines: &[S], trailing_newline: bool) -> String {
    let mut out = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    if trailing_newline && !lines.is_empty() {
        out.push('\n');
    }
    out
}

/// The complete new sequence an edit script was computed against.
pub fn new_side(script: &EditScript) -> Vec<String> {
    script
        .iter()
        .flat_map(|op| op.new_lines.iter().cloned())
        .collect()
}

/// Git-style unified diff between two texts, for display.
pub fn render_unified(old: &str, new: &str, old_header: &str, new_header: &str) -> String {
    let old = old.replace("\r\n", "\n");
    let new = new.replace("\r\n", "\n");
    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header(old_header, new_header)
        .context_radius(3)
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(s: &[&str]) -> Vec<String> {
        s.iter().map(|l| l.to_string()).collect()
    }

    fn kinds(script: &EditScript) -> Vec<OpKind> {
        script.iter().map(|op| op.kind).collect()
    }

    /// Ranges are contiguous, increasing, and cover both sides.
    fn assert_covers(script: &EditScript, old_len: usize, new_len: usize) {
        let (mut o, mut n) = (0, 0);
        for op in script {
            assert_eq!(op.old_range.start, o, "old gap before {op:?}");
            assert_eq!(op.new_range.start, n, "new gap before {op:?}");
            assert!(!(op.old_range.is_empty() && op.new_range.is_empty()));
            o = op.old_range.end;
            n = op.new_range.end;
        }
        assert_eq!((o, n), (old_len, new_len));
    }

    #[test]
    fn identical_inputs_give_single_equal() {
        let a = lines(&["a", "b", "c"]);
        let script = LineDiffAnalyzer::new().analyze(&a, &a);
        assert_eq!(kinds(&script), vec![OpKind::Equal]);
        assert_covers(&script, 3, 3);
    }

    #[test]
    fn both_empty_gives_empty_script() {
        let empty: Vec<String> = Vec::new();
        assert!(LineDiffAnalyzer::new().analyze(&empty, &empty).is_empty());
    }

    #[test]
    fn empty_old_is_single_insert() {
        let empty: Vec<String> = Vec::new();
        let new = lines(&["x", "y"]);
        let script = LineDiffAnalyzer::new().analyze(&empty, &new);
        assert_eq!(kinds(&script), vec![OpKind::Insert]);
        assert_eq!(script.operations()[0].new_range, LineRange::new(0, 2));
    }

    #[test]
    fn empty_new_is_single_delete() {
        let empty: Vec<String> = Vec::new();
        let old = lines(&["x", "y"]);
        let script = LineDiffAnalyzer::new().analyze(&old, &empty);
        assert_eq!(kinds(&script), vec![OpKind::Delete]);
        assert_eq!(script.operations()[0].old_range, LineRange::new(0, 2));
    }

    #[test]
    fn changed_line_becomes_replace() {
        let old = lines(&["# Title", "", "You need Java 17."]);
        let new = lines(&["# Title", "", "You need Java 21."]);
        let script = LineDiffAnalyzer::new().analyze(&old, &new);
        assert_eq!(kinds(&script), vec![OpKind::Equal, OpKind::Replace]);
        let replace = &script.operations()[1];
        assert_eq!(replace.old_range, LineRange::new(2, 3));
        assert_eq!(replace.old_lines, vec!["You need Java 17."]);
        assert_eq!(replace.new_lines, vec!["You need Java 21."]);
        assert_covers(&script, 3, 3);
    }

    #[test]
    fn mixed_edits_cover_both_sides() {
        let old = lines(&["a", "b", "c", "d", "e", "f"]);
        let new = lines(&["a", "x", "c", "d", "f", "g", "h"]);
        let script = LineDiffAnalyzer::new().analyze(&old, &new);
        assert_covers(&script, old.len(), new.len());
        assert_eq!(
            kinds(&script),
            vec![
                OpKind::Equal,
                OpKind::Replace,
                OpKind::Equal,
                OpKind::Delete,
                OpKind::Equal,
                OpKind::Insert
            ]
        );
    }

    #[test]
    fn disjoint_inputs_give_single_replace() {
        let old = lines(&["1", "2", "3", "4"]);
        let new = lines(&["a", "b", "c"]);
        let script = LineDiffAnalyzer::new().analyze(&old, &new);
        assert_eq!(kinds(&script), vec![OpKind::Replace]);
        assert_covers(&script, 4, 3);
    }

    #[test]
    fn applying_new_side_reconstructs_new() {
        let old = lines(&["a", "b", "c", "d"]);
        let new = lines(&["b", "c", "z", "d", "e"]);
        let script = LineDiffAnalyzer::new().analyze(&old, &new);
        assert_eq!(new_side(&script), new);
        let old_side: Vec<String> = script
            .iter()
            .flat_map(|op| op.old_lines.iter().cloned())
            .collect();
        assert_eq!(old_side, old);
    }

    #[test]
    fn analysis_is_deterministic() {
        let old = lines(&["a", "b", "a", "b", "c"]);
        let new = lines(&["b", "a", "b", "c", "a"]);
        let analyzer = LineDiffAnalyzer::new();
        assert_eq!(analyzer.analyze(&old, &new), analyzer.analyze(&old, &new));
    }

    #[test]
    fn large_input_respects_invariants_under_deadline() {
        let old: Vec<String> = (0..20_000).map(|i| format!("line {i}")).collect();
        let new: Vec<String> = (0..20_000)
            .map(|i| {
                if i % 97 == 0 {
                    format!("changed {i}")
                } else {
                    format!("line {i}")
                }
            })
            .collect();
        let script = LineDiffAnalyzer::with_timeout(Some(Duration::from_millis(50)))
            .analyze(&old, &new);
        assert_covers(&script, old.len(), new.len());
        assert_eq!(new_side(&script), new);
    }

    #[test]
    fn split_and_join_preserve_content() {
        let lines = split_lines("a\r\nb\n\nc\n");
        assert_eq!(lines, vec!["a", "b", "", "c"]);
        assert_eq!(join_lines(&lines, true), "a\nb\n\nc\n");
        assert_eq!(join_lines(&lines, false), "a\nb\n\nc");
        assert_eq!(join_lines::<String>(&[], true), "");
    }

    #[test]
    fn unified_diff_marks_changes() {
        let out = render_unified("a\nb\n", "a\nc\n", "a/doc.md", "b/doc.md");
        assert!(out.contains("--- a/doc.md"));
        assert!(out.contains("-b"));
        assert!(out.contains("+c"));
    }
}
