//! Gemini `generateContent` client over blocking HTTP.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use transync_core::config::LlmConfig;

use crate::error::LlmError;
use crate::gate::AdmissionGate;
use crate::prompt::{translation_prompt, StyleGuide};
use crate::retry::RetryPolicy;
use crate::service::{PromptMode, TranslationRequest, Translated, TranslationService};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect();
        let text = text.trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GeminiTranslator {
    agent: ureq::Agent,
    api_key: SecretString,
    config: LlmConfig,
    guide: StyleGuide,
    gate: AdmissionGate,
    retry: RetryPolicy,
}

impl GeminiTranslator {
    pub fn new(api_key: SecretString, config: LlmConfig, guide: StyleGuide) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build();
        let gate = AdmissionGate::new(config.max_concurrent_requests, config.requests_per_minute);
        let retry = RetryPolicy {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter_max: Duration::from_millis(config.jitter_max_ms),
        };
        Self {
            agent,
            api_key,
            config,
            guide,
            gate,
            retry,
        }
    }

    /// Build from `GEMINI_API_KEY`.
    pub fn from_env(config: LlmConfig, guide: StyleGuide) -> Result<Self, LlmError> {
        let key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;
        Ok(Self::new(SecretString::new(key.into()), config, guide))
    }

    /// Larger inputs go to the pro model.
    pub fn select_model(&self, text: &str) -> &str {
        select_model(&self.config, text)
    }

    fn send(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            model
        );
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
            },
        };

        let _permit = self.gate.acquire();
        let response = self
            .agent
            .post(&url)
            .set("x-goog-api-key", self.api_key.expose_secret())
            .set("Content-Type", "application/json")
            .send_json(&body);

        match response {
            Ok(res) => {
                let parsed: GenerateResponse = res
                    .into_json()
                    .map_err(|e| LlmError::Malformed(e.to_string()))?;
                parsed.into_text().ok_or(LlmError::EmptyResponse)
            }
            Err(ureq::Error::Status(code, res)) => Err(LlmError::Status {
                code,
                body: res.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(t)) => {
                let msg = t.to_string();
                if msg.to_ascii_lowercase().contains("timed out") {
                    Err(LlmError::Timeout)
                } else {
                    Err(LlmError::Transport(msg))
                }
            }
        }
    }
}

pub fn select_model<'a>(config: &'a LlmConfig, text: &str) -> &'a str {
    let chars = text.chars().count();
    let lines = text.lines().count();
    if chars >= config.pro_threshold_chars || lines >= config.pro_threshold_lines {
        &config.pro_model
    } else {
        &config.flash_model
    }
}

impl TranslationService for GeminiTranslator {
    fn translate(&self, request: &TranslationRequest<'_>) -> Result<Translated, LlmError> {
        let prompt = match request.mode {
            PromptMode::Translate => translation_prompt(
                request.text,
                request.document,
                &self.config.target_language,
                &self.guide,
            ),
            PromptMode::Verbatim => request.text.to_string(),
        };
        let model = self.select_model(request.text).to_string();
        tracing::debug!(document = %request.document, model = %model, "calling model");

        let text = self.retry.run(|_| self.send(&model, &prompt))?;
        Ok(Translated { text, model })
    }
}
