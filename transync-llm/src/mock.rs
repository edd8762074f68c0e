//! Deterministic offline translation service.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::LlmError;
use crate::service::{PromptMode, TranslationRequest, Translated, TranslationService};

pub const MOCK_MODEL: &str = "mock";

/// Translates by prefixing each line with a marker and answers verbatim
/// prompts with a fixed reply. Every call is counted.
#[derive(Debug)]
pub struct MockTranslator {
    prefix: String,
    reply: Mutex<String>,
    failing: AtomicBool,
    calls: AtomicUsize,
    translate_calls: AtomicUsize,
    verbatim_calls: AtomicUsize,
}

impl Default for MockTranslator {
    fn default() -> Self {
        Self::new("[ja] ")
    }
}

impl MockTranslator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            reply: Mutex::new("NO".to_string()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            translate_calls: AtomicUsize::new(0),
            verbatim_calls: AtomicUsize::new(0),
        }
    }

    /// Reply returned for verbatim prompts.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        *self.reply.lock() = reply.into();
        self
    }

    /// Make every subsequent call fail with a terminal error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn translate_calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }

    pub fn verbatim_calls(&self) -> usize {
        self.verbatim_calls.load(Ordering::SeqCst)
    }
}

impl TranslationService for MockTranslator {
    fn translate(&self, request: &TranslationRequest<'_>) -> Result<Translated, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(LlmError::Status {
                code: 400,
                body: "mock translator is failing".to_string(),
            });
        }
        let text = match request.mode {
            PromptMode::Translate => {
                self.translate_calls.fetch_add(1, Ordering::SeqCst);
                request
                    .text
                    .lines()
                    .map(|l| format!("{}{}", self.prefix, l))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            PromptMode::Verbatim => {
                self.verbatim_calls.fetch_add(1, Ordering::SeqCst);
                self.reply.lock().clone()
            }
        };
        Ok(Translated {
            text,
            model: MOCK_MODEL.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transync_core::DocPath;

    #[test]
    fn translate_prefixes_lines_and_counts() {
        let mock = MockTranslator::default();
        let doc = DocPath::from("docs/a.md");
        let out = mock
            .translate(&TranslationRequest::translate("a\nb", &doc))
            .unwrap();
        assert_eq!(out.text, "[ja] a\n[ja] b");
        assert_eq!(out.model, MOCK_MODEL);
        assert_eq!(mock.calls(), 1);
        assert_eq!(mock.translate_calls(), 1);
    }

    #[test]
    fn verbatim_returns_reply() {
        let mock = MockTranslator::default().with_reply("YES, it changed");
        let doc = DocPath::from("docs/a.md");
        let out = mock
            .translate(&TranslationRequest::verbatim("question", &doc))
            .unwrap();
        assert_eq!(out.text, "YES, it changed");
        assert_eq!(mock.verbatim_calls(), 1);
    }

    #[test]
    fn failing_mode_is_terminal() {
        let mock = MockTranslator::default();
        mock.set_failing(true);
        let doc = DocPath::from("docs/a.md");
        let err = mock
            .translate(&TranslationRequest::translate("a", &doc))
            .unwrap_err();
        assert!(!err.is_transient());
        assert_eq!(mock.calls(), 1);
    }
}
