//! Edit operation → translation action.
//!
//! [`PolicyEngine::decide`] is the decision table. [`PolicyEngine::resolve`]
//! turns a decision into a [`TranslationAction`], translating the new-range
//! lines when the action needs it. Each translatable line is looked up in
//! the cache first, and the service is only called on a miss.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use transync_core::{ActionKind, DocPath, EditOperation, EditScript, OpKind, RevisionId, TranslationAction};
use transync_llm::{TranslationRequest, TranslationService};

use crate::cache::TranslationCache;
use crate::error::SyncError;
use crate::oracle::SemanticChangeOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Fence,
    Code,
    Text,
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

/// Per-document inputs to line translation.
#[derive(Debug, Clone)]
pub struct DocumentContext {
    pub path: DocPath,
    /// Revision the cache is keyed on.
    pub cache_revision: RevisionId,
    kinds: Vec<LineKind>,
}

impl DocumentContext {
    /// `new_lines` is the complete new upstream document; fenced code is
    /// detected over all of it so a block opened outside an operation is
    /// still recognised inside it.
    pub fn new<S: AsRef<str>>(path: DocPath, cache_revision: RevisionId, new_lines: &[S]) -> Self {
        let mut in_fence = false;
        let kinds = new_lines
            .iter()
            .map(|line| {
                let line = line.as_ref();
                if is_fence(line) {
                    in_fence = !in_fence;
                    LineKind::Fence
                } else if in_fence {
                    LineKind::Code
                } else if line.trim().is_empty() {
                    LineKind::Blank
                } else {
                    LineKind::Text
                }
            })
            .collect();
        Self {
            path,
            cache_revision,
            kinds,
        }
    }

    fn kind_at(&self, index: usize, line: &str) -> LineKind {
        match self.kinds.get(index) {
            Some(kind) => *kind,
            None if line.trim().is_empty() => LineKind::Blank,
            None => LineKind::Text,
        }
    }
}

/// Counters reported with every batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PolicyStats {
    pub oracle_calls: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub service_calls: usize,
    pub passthrough_lines: usize,
}

#[derive(Debug, Default)]
struct Counters {
    oracle_calls: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    service_calls: AtomicUsize,
    passthrough_lines: AtomicUsize,
}

pub struct PolicyEngine {
    oracle: Arc<dyn SemanticChangeOracle>,
    cache: Arc<TranslationCache>,
    translator: Arc<dyn TranslationService>,
    counters: Counters,
}

impl PolicyEngine {
    pub fn new(
        oracle: Arc<dyn SemanticChangeOracle>,
        cache: Arc<TranslationCache>,
        translator: Arc<dyn TranslationService>,
    ) -> Self {
        Self {
            oracle,
            cache,
            translator,
            counters: Counters::default(),
        }
    }

    pub fn cache(&self) -> &Arc<TranslationCache> {
        &self.cache
    }

    /// Decide the action for one classified operation.
    ///
    /// The oracle is consulted only for a non-minor `Replace`.
    pub fn decide(&self, path: &DocPath, op: &EditOperation) -> ActionKind {
        match op.kind {
            OpKind::Equal => ActionKind::KeepExisting,
            OpKind::Insert => ActionKind::NewTranslation,
            OpKind::Delete => ActionKind::Delete,
            OpKind::Replace if op.is_minor => ActionKind::KeepExisting,
            OpKind::Replace => {
                self.counters.oracle_calls.fetch_add(1, Ordering::Relaxed);
                if self
                    .oracle
                    .has_semantic_change(path, &op.old_text(), &op.new_text())
                {
                    ActionKind::Retranslate
                } else {
                    ActionKind::KeepExisting
                }
            }
        }
    }

    pub fn decide_all(&self, path: &DocPath, script: &EditScript) -> Vec<ActionKind> {
        script.iter().map(|op| self.decide(path, op)).collect()
    }

    /// Produce the concrete action for `op`, translating where needed.
    pub fn resolve(
        &self,
        op: &EditOperation,
        kind: ActionKind,
        ctx: &DocumentContext,
    ) -> Result<TranslationAction, SyncError> {
        Ok(match kind {
            ActionKind::KeepExisting => TranslationAction::KeepExisting,
            ActionKind::Delete => TranslationAction::Delete,
            ActionKind::NewTranslation => TranslationAction::NewTranslation {
                lines: self.translate_lines(op, ctx)?,
            },
            ActionKind::Retranslate => TranslationAction::Retranslate {
                lines: self.translate_lines(op, ctx)?,
            },
        })
    }

    /// Resolve every operation of `script`; stops at the first failure.
    pub fn resolve_all(
        &self,
        script: &EditScript,
        kinds: &[ActionKind],
        ctx: &DocumentContext,
    ) -> Result<Vec<TranslationAction>, SyncError> {
        script
            .iter()
            .zip(kinds)
            .map(|(op, kind)| self.resolve(op, *kind, ctx))
            .collect()
    }

    fn translate_lines(
        &self,
        op: &EditOperation,
        ctx: &DocumentContext,
    ) -> Result<Vec<String>, SyncError> {
        op.new_lines
            .iter()
            .enumerate()
            .map(|(offset, line)| self.translate_line(op.new_range.start + offset, line, ctx))
            .collect()
    }

    fn translate_line(
        &self,
        index: usize,
        line: &str,
        ctx: &DocumentContext,
    ) -> Result<String, SyncError> {
        if ctx.kind_at(index, line) != LineKind::Text {
            self.counters.passthrough_lines.fetch_add(1, Ordering::Relaxed);
            return Ok(line.to_string());
        }

        if let Some(hit) = self.cache.get(&ctx.path, &ctx.cache_revision, index, line) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);

        let indent_len = line.len() - line.trim_start().len();
        let (indent, body) = line.split_at(indent_len);

        self.counters.service_calls.fetch_add(1, Ordering::Relaxed);
        let translated = self
            .translator
            .translate(&TranslationRequest::translate(body.trim_end(), &ctx.path))
            .map_err(|source| SyncError::Translation {
                path: ctx.path.clone(),
                line: index + 1,
                source,
            })?;

        let joined = translated
            .text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let out = format!("{indent}{joined}");

        self.cache.put(
            &ctx.path,
            &ctx.cache_revision,
            index,
            line,
            &out,
            &translated.model,
        );
        Ok(out)
    }

    pub fn stats(&self) -> PolicyStats {
        PolicyStats {
            oracle_calls: self.counters.oracle_calls.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            service_calls: self.counters.service_calls.load(Ordering::Relaxed),
            passthrough_lines: self.counters.passthrough_lines.load(Ordering::Relaxed),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
