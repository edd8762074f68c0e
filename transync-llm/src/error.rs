//! Error types for transync-llm.

use thiserror::Error;

/// Failure of a translation service call.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status with the response body.
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("model returned an empty response")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,

    /// Transient failures persisted past the retry ceiling.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<LlmError>,
    },
}

impl LlmError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::Timeout | LlmError::EmptyResponse => true,
            LlmError::Status { code, .. } => *code == 429 || (500..=599).contains(code),
            LlmError::Malformed(_) | LlmError::MissingApiKey | LlmError::Exhausted { .. } => false,
        }
    }
}
