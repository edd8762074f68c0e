//! Similarity scoring and the minor-change test for `Replace` operations.
//!
//! A replace is *minor* when all of these hold:
//! - character similarity ratio ≥ `thresholds.similarity`;
//! - relative token-count delta ≤ `thresholds.token_ratio` (tokens are word
//!   runs plus single non-space punctuation characters);
//! - the *essential* text (word characters only, full-width ASCII folded to
//!   half-width) is identical.
//!
//! An empty old side is never minor.

use std::sync::LazyLock;

use regex::Regex;
use similar::TextDiff;

use transync_core::{EditOperation, EditScript, MinorThresholds, OpKind};

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|[^\w\s]").expect("token pattern is valid"));

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\W+").expect("non-word pattern is valid"));

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeClassifier {
    thresholds: MinorThresholds,
}

impl ChangeClassifier {
    pub fn new(thresholds: MinorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> MinorThresholds {
        self.thresholds
    }

    /// Score a single operation. Only `Replace` gets a ratio and may be minor.
    pub fn classify(&self, mut op: EditOperation) -> EditOperation {
        if op.kind != OpKind::Replace {
            op.similarity_ratio = None;
            op.is_minor = false;
            return op;
        }
        let old = op.old_text();
        let new = op.new_text();
        let ratio = similarity_ratio(&old, &new);
        op.similarity_ratio = Some(ratio);
        op.is_minor = is_minor_with_ratio(&old, &new, ratio, &self.thresholds);
        op
    }

    /// Classify every operation, producing a new script.
    pub fn classify_script(&self, script: EditScript) -> EditScript {
        let ops = script
            .operations()
            .iter()
            .cloned()
            .map(|op| self.classify(op))
            .collect();
        EditScript::new(ops)
    }

    pub fn is_minor(&self, old: &str, new: &str) -> bool {
        is_minor_change(old, new, &self.thresholds)
    }
}

/// `2 * matches / (len(a) + len(b))` over characters; 1.0 for two empty strings.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio())
}

pub fn is_minor_change(old: &str, new: &str, thresholds: &MinorThresholds) -> bool {
    if old.is_empty() {
        return false;
    }
    is_minor_with_ratio(old, new, similarity_ratio(old, new), thresholds)
}

fn is_minor_with_ratio(old: &str, new: &str, ratio: f64, thresholds: &MinorThresholds) -> bool {
    if old.is_empty() || ratio < thresholds.similarity {
        return false;
    }

    let old_tokens = token_count(old);
    if old_tokens > 0 {
        let delta = token_count(new).abs_diff(old_tokens) as f64 / old_tokens as f64;
        if delta > thresholds.token_ratio {
            return false;
        }
    }

    essential_text(old) == essential_text(new)
}

pub fn tokenize(text: &str) -> Vec<&str> {
    TOKEN_RE.find_iter(text).map(|m| m.as_str()).collect()
}

fn token_count(text: &str) -> usize {
    TOKEN_RE.find_iter(text).count()
}

/// Word characters only, with full-width ASCII folded to half-width.
pub fn essential_text(text: &str) -> String {
    let folded = fold_width(text);
    NON_WORD_RE.replace_all(&folded, "").into_owned()
}

/// Map U+FF01..=U+FF5E to ASCII and the ideographic space to a space.
pub fn fold_width(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
