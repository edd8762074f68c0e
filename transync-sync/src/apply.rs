//! Rewriting an existing translation from an edit script and resolved actions.
//!
//! Operations are applied in descending `(old_range.start, position)` order.
//! An operation later in the document is therefore rewritten before any
//! earlier one, so no operation is ever addressed through an offset that a
//! previous rewrite has shifted. The ordering is computed here; callers'
//! order is never trusted.

use thiserror::Error;

use transync_core::{ActionKind, EditOperation, EditScript, LineRange, OpKind, TranslationAction};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("edit script has {ops} operations but {actions} actions were supplied")]
    ActionCountMismatch { ops: usize, actions: usize },

    #[error("operation {index} ({kind}) cannot take action {action}")]
    IncompatibleAction {
        index: usize,
        kind: OpKind,
        action: ActionKind,
    },

    #[error("operation {index} addresses lines {range} but the document has {len} lines")]
    RangeOutOfBounds {
        index: usize,
        range: LineRange,
        len: usize,
    },
}

/// Apply `actions` (one per operation of `script`) to `existing`.
///
/// `existing` is left untouched; the rewritten document is returned. Ranges
/// are interpreted against `existing`, so the translation must line up with
/// the old upstream side of the script.
pub fn apply(
    existing: &[String],
    script: &EditScript,
    actions: &[TranslationAction],
) -> Result<Vec<String>, ApplyError> {
    let ops = script.operations();
    if ops.len() != actions.len() {
        return Err(ApplyError::ActionCountMismatch {
            ops: ops.len(),
            actions: actions.len(),
        });
    }
    for (index, (op, action)) in ops.iter().zip(actions).enumerate() {
        check(index, op, action, existing.len())?;
    }

    let mut order: Vec<usize> = (0..ops.len()).collect();
    order.sort_by(|&a, &b| {
        (ops[b].old_range.start, b).cmp(&(ops[a].old_range.start, a))
    });

    let mut out = existing.to_vec();
    for index in order {
        let range = ops[index].old_range.as_range();
        match &actions[index] {
            TranslationAction::KeepExisting => {}
            TranslationAction::NewTranslation { lines } => {
                out.splice(range.start..range.start, lines.iter().cloned());
            }
            TranslationAction::Delete => {
                out.drain(range);
            }
            TranslationAction::Retranslate { lines } => {
                out.splice(range, lines.iter().cloned());
            }
        }
    }

    debug_assert_eq!(out.len(), expected_len(existing.len(), ops, actions));
    Ok(out)
}

fn check(
    index: usize,
    op: &EditOperation,
    action: &TranslationAction,
    len: usize,
) -> Result<(), ApplyError> {
    let compatible = match action.kind() {
        ActionKind::KeepExisting => true,
        ActionKind::NewTranslation => op.kind == OpKind::Insert,
        ActionKind::Delete => op.kind == OpKind::Delete,
        ActionKind::Retranslate => op.kind == OpKind::Replace,
    };
    if !compatible {
        return Err(ApplyError::IncompatibleAction {
            index,
            kind: op.kind,
            action: action.kind(),
        });
    }
    if op.old_range.end > len || op.old_range.start > op.old_range.end {
        return Err(ApplyError::RangeOutOfBounds {
            index,
            range: op.old_range,
            len,
        });
    }
    Ok(())
}

fn expected_len(start: usize, ops: &[EditOperation], actions: &[TranslationAction]) -> usize {
    ops.iter().zip(actions).fold(start, |len, (op, action)| match action {
        TranslationAction::KeepExisting => len,
        TranslationAction::NewTranslation { lines } => len + lines.len(),
        TranslationAction::Delete => len - op.old_range.len(),
        TranslationAction::Retranslate { lines } => len - op.old_range.len() + lines.len(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
