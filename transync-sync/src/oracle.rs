//! Semantic-change judgments for replaces that are not minor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use transync_core::DocPath;
use transync_llm::{TranslationRequest, TranslationService};

use crate::classify::essential_text;

/// Decides whether a non-minor edit changes meaning.
///
/// Implementations never fail: an unavailable backend degrades to a
/// deterministic heuristic.
pub trait SemanticChangeOracle: Send + Sync {
    fn has_semantic_change(&self, document: &DocPath, old: &str, new: &str) -> bool;
}

// ---------------------------------------------------------------------------
// Heuristic
// ---------------------------------------------------------------------------

/// Relative essential-length delta above this is a semantic change.
pub const LENGTH_DELTA_THRESHOLD: f64 = 0.10;

/// Length-based fallback: a change is semantic when the essential text grows
/// or shrinks by more than 10%.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicOracle;

impl HeuristicOracle {
    pub fn judge(old: &str, new: &str) -> bool {
        let old_e = essential_text(old);
        let new_e = essential_text(new);
        let old_len = old_e.chars().count();
        if old_len == 0 {
            return old_e != new_e;
        }
        let new_len = new_e.chars().count();
        new_len.abs_diff(old_len) as f64 / old_len as f64 > LENGTH_DELTA_THRESHOLD
    }
}

impl SemanticChangeOracle for HeuristicOracle {
    fn has_semantic_change(&self, _document: &DocPath, old: &str, new: &str) -> bool {
        Self::judge(old, new)
    }
}

// ---------------------------------------------------------------------------
// Service-backed
// ---------------------------------------------------------------------------

/// Asks the translation service for a YES/NO judgment.
///
/// The reply must start with `YES` or `NO` (case-insensitive, after
/// trimming). Anything else, or a service error, falls back to
/// [`HeuristicOracle`].
pub struct LlmOracle {
    service: Arc<dyn TranslationService>,
    asked: AtomicUsize,
    fallbacks: AtomicUsize,
}

impl LlmOracle {
    pub fn new(service: Arc<dyn TranslationService>) -> Self {
        Self {
            service,
            asked: AtomicUsize::new(0),
            fallbacks: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::Relaxed)
    }

    pub fn fallbacks(&self) -> usize {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

impl SemanticChangeOracle for LlmOracle {
    fn has_semantic_change(&self, document: &DocPath, old: &str, new: &str) -> bool {
        self.asked.fetch_add(1, Ordering::Relaxed);
        let prompt = judgment_prompt(old, new);
        let reply = self
            .service
            .translate(&TranslationRequest::verbatim(&prompt, document));

        let judged = match reply {
            Ok(r) => {
                let parsed = parse_judgment(&r.text);
                if parsed.is_none() {
                    tracing::warn!(
                        "{document}: unparseable change judgment {:?}, using heuristic",
                        r.text
                    );
                }
                parsed
            }
            Err(e) => {
                tracing::warn!("{document}: change judgment unavailable ({e}), using heuristic");
                None
            }
        };

        judged.unwrap_or_else(|| {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
            HeuristicOracle::judge(old, new)
        })
    }
}

/// `Some(true)` for a `YES…` reply, `Some(false)` for `NO…`, else `None`.
pub fn parse_judgment(reply: &str) -> Option<bool> {
    let head: String = reply.trim().chars().take(3).collect::<String>().to_ascii_uppercase();
    if head.starts_with("YES") {
        Some(true)
    } else if head.starts_with("NO") {
        Some(false)
    } else {
        None
    }
}

const RUBRIC: &str = "Answer YES if the new version of this documentation line changes \
its content, structure, links or code, and NO if it only changes punctuation, whitespace or \
character width; reply with YES or NO only.";

fn judgment_prompt(old: &str, new: &str) -> String {
    format!("{RUBRIC}\n\nOld:\n{old}\n\nNew:\n{new}\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use transync_llm::MockTranslator;

    #[rstest]
    #[case("YES", Some(true))]
    #[case("  yes, the version changed", Some(true))]
    #[case("No.", Some(false))]
    #[case("NO", Some(false))]
    #[case("Maybe", None)]
    #[case("", None)]
    #[case("The answer is YES", None)]
    fn judgment_parsing(#[case] reply: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_judgment(reply), expected);
    }

    #[test]
    fn heuristic_uses_essential_length_delta() {
        // Same essential length: digits swapped.
        assert!(!HeuristicOracle::judge("You need Java 17.", "You need Java 21."));
        // Large growth.
        assert!(HeuristicOracle::judge(
            "Use the database",
            "Use the embedded H2 database in development"
        ));
        // Empty old essential compares content.
        assert!(HeuristicOracle::judge("---", "text"));
        assert!(!HeuristicOracle::judge("---", "***"));
    }

    #[test]
    fn llm_reply_decides_when_parseable() {
        let doc = DocPath::from("docs/a.md");
        let mock = Arc::new(MockTranslator::default().with_reply("YES"));
        let oracle = LlmOracle::new(mock.clone());
        assert!(oracle.has_semantic_change(&doc, "You need Java 17.", "You need Java 21."));
        assert_eq!(mock.verbatim_calls(), 1);
        assert_eq!(oracle.fallbacks(), 0);
    }

    #[test]
    fn unparseable_reply_falls_back_to_heuristic() {
        let doc = DocPath::from("docs/a.md");
        let mock = Arc::new(MockTranslator::default().with_reply("I think so"));
        let oracle = LlmOracle::new(mock);
        assert!(!oracle.has_semantic_change(&doc, "You need Java 17.", "You need Java 21."));
        assert_eq!(oracle.fallbacks(), 1);
    }

    #[test]
    fn service_error_falls_back_to_heuristic() {
        let doc = DocPath::from("docs/a.md");
        let mock = Arc::new(MockTranslator::default().with_reply("NO"));
        mock.set_failing(true);
        let oracle = LlmOracle::new(mock);
        assert!(oracle.has_semantic_change(
            &doc,
            "Use the database",
            "Use the embedded H2 database in development"
        ));
        assert_eq!(oracle.asked(), 1);
        assert_eq!(oracle.fallbacks(), 1);
    }

    #[test]
    fn prompt_is_one_rubric_sentence_then_both_versions() {
        let p = judgment_prompt("old text", "new text");
        assert!(p.contains("Old:\nold text"));
        assert!(p.contains("New:\nnew text"));
        let rubric = p.lines().next().unwrap();
        assert_eq!(rubric, RUBRIC);
        assert_eq!(rubric.matches(". ").count(), 0);
    }
}
