//! # transync-llm
//!
//! The external translation service behind one blocking trait,
//! [`TranslationService`], plus what every real implementation needs:
//! an [`AdmissionGate`] (in-flight cap and rolling per-minute limit) and a
//! [`RetryPolicy`] (exponential backoff with jitter, transient errors only).

pub mod error;
pub mod gate;
pub mod gemini;
pub mod mock;
pub mod prompt;
pub mod retry;
pub mod service;

pub use error::LlmError;
pub use gate::AdmissionGate;
pub use gemini::GeminiTranslator;
pub use mock::MockTranslator;
pub use prompt::StyleGuide;
pub use retry::RetryPolicy;
pub use service::{PromptMode, TranslationRequest, Translated, TranslationService};
