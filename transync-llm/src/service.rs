//! The translation service seam.

use transync_core::DocPath;

use crate::error::LlmError;

/// How the service should treat [`TranslationRequest::text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// Wrap the text in the translation prompt (style guide included).
    Translate,
    /// Send the text as the whole prompt.
    Verbatim,
}

#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    pub text: &'a str,
    pub document: &'a DocPath,
    pub mode: PromptMode,
}

impl<'a> TranslationRequest<'a> {
    pub fn translate(text: &'a str, document: &'a DocPath) -> Self {
        Self {
            text,
            document,
            mode: PromptMode::Translate,
        }
    }

    pub fn verbatim(text: &'a str, document: &'a DocPath) -> Self {
        Self {
            text,
            document,
            mode: PromptMode::Verbatim,
        }
    }
}

/// Service response: the text plus the model that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translated {
    pub text: String,
    pub model: String,
}

/// External text-generation service used for translation and for semantic
/// change judgments.
///
/// Implementations are blocking and must be safe to call from many threads;
/// rate limiting and retries are the implementation's concern.
pub trait TranslationService: Send + Sync {
    fn translate(&self, request: &TranslationRequest<'_>) -> Result<Translated, LlmError>;
}
