//! Repository-local YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! <root>/.transync/
//!   config.yaml       (optional; defaults apply when absent)
//!   manifest.json     (see transync-sync::manifest)
//!   cache.sqlite3     (see transync-sync::cache)
//! ```
//!
//! Every field has a default, so a partial file only overrides what it names.
//! The LLM section additionally honours `GEMINI_*` environment variables via
//! [`Config::apply_env_overrides`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::DocPath;

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<root>/.transync/`
pub fn state_dir_at(root: &Path) -> PathBuf {
    root.join(".transync")
}

/// `<root>/.transync/config.yaml`
pub fn config_path_at(root: &Path) -> PathBuf {
    state_dir_at(root).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where the upstream source tree lives, as a git remote branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub remote: String,
    pub branch: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            remote: "upstream".to_string(),
            branch: "main".to_string(),
        }
    }
}

impl UpstreamConfig {
    /// `remote/branch`, the default target revision.
    pub fn tracking_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

/// Thresholds for the minor-change test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinorThresholds {
    /// Minimum character similarity ratio.
    pub similarity: f64,
    /// Maximum relative token-count delta.
    pub token_ratio: f64,
}

impl Default for MinorThresholds {
    fn default() -> Self {
        Self {
            similarity: 0.90,
            token_ratio: 0.20,
        }
    }
}

/// Per-extension threshold override; unset fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    pub extension: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_ratio_threshold: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub similarity_threshold: f64,
    pub token_ratio_threshold: f64,
    /// Upper bound on alignment time per document; `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_timeout_ms: Option<u64>,
    pub overrides: Vec<ThresholdOverride>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        let t = MinorThresholds::default();
        Self {
            similarity_threshold: t.similarity,
            token_ratio_threshold: t.token_ratio,
            diff_timeout_ms: Some(5_000),
            overrides: Vec::new(),
        }
    }
}

impl ClassifierConfig {
    /// Thresholds for `path`, honouring any extension override.
    pub fn thresholds_for(&self, path: &DocPath) -> MinorThresholds {
        let mut t = MinorThresholds {
            similarity: self.similarity_threshold,
            token_ratio: self.token_ratio_threshold,
        };
        let Some(ext) = path.extension() else {
            return t;
        };
        if let Some(o) = self
            .overrides
            .iter()
            .find(|o| o.extension.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        {
            if let Some(s) = o.similarity_threshold {
                t.similarity = s;
            }
            if let Some(r) = o.token_ratio_threshold {
                t.token_ratio = r;
            }
        }
        t
    }
}

/// Which upstream paths are translatable documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub extensions: Vec<String>,
    pub exclude_prefixes: Vec<String>,
    /// Skip documents at the repository root (README, LICENSE, ...).
    pub require_subdirectory: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            extensions: ["md", "mdx", "adoc", "html"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_prefixes: vec![".".to_string()],
            require_subdirectory: true,
        }
    }
}

/// Style guide that applies to documents under `path_prefix`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleGuideOverride {
    pub path_prefix: String,
    pub file: PathBuf,
}

/// Translation service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub endpoint: String,
    pub flash_model: String,
    pub pro_model: String,
    pub pro_threshold_chars: usize,
    pub pro_threshold_lines: usize,
    pub target_language: String,
    pub max_concurrent_requests: usize,
    pub requests_per_minute: usize,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_max_ms: u64,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_guide: Option<PathBuf>,
    pub style_guide_overrides: Vec<StyleGuideOverride>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            flash_model: "gemini-1.5-flash".to_string(),
            pro_model: "gemini-1.5-pro".to_string(),
            pro_threshold_chars: 8_000,
            pro_threshold_lines: 200,
            target_language: "Japanese".to_string(),
            max_concurrent_requests: 3,
            requests_per_minute: 60,
            max_retries: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_max_ms: 500,
            request_timeout_secs: 120,
            temperature: 0.1,
            style_guide: None,
            style_guide_overrides: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// `cache prune` drops entries not accessed for this many days.
    pub retention_days: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub upstream: UpstreamConfig,
    /// Translated tree, relative to the repository root.
    pub translated_root: PathBuf,
    pub manifest_path: PathBuf,
    pub cache_path: PathBuf,
    pub classifier: ClassifierConfig,
    pub filters: FilterConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            translated_root: PathBuf::from("."),
            manifest_path: PathBuf::from(".transync/manifest.json"),
            cache_path: PathBuf::from(".transync/cache.sqlite3"),
            classifier: ClassifierConfig::default(),
            filters: FilterConfig::default(),
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn translated_root_at(&self, root: &Path) -> PathBuf {
        resolve(root, &self.translated_root)
    }

    pub fn manifest_path_at(&self, root: &Path) -> PathBuf {
        resolve(root, &self.manifest_path)
    }

    pub fn cache_path_at(&self, root: &Path) -> PathBuf {
        resolve(root, &self.cache_path)
    }

    /// Apply `GEMINI_*` overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm = &mut self.llm;
        override_from(&lookup, "GEMINI_MAX_CONCURRENT", &mut llm.max_concurrent_requests)?;
        override_from(&lookup, "GEMINI_REQUESTS_PER_MINUTE", &mut llm.requests_per_minute)?;
        override_from(&lookup, "GEMINI_MAX_RETRIES", &mut llm.max_retries)?;
        override_from(&lookup, "GEMINI_BASE_DELAY_MS", &mut llm.base_delay_ms)?;
        override_from(&lookup, "GEMINI_REQUEST_TIMEOUT", &mut llm.request_timeout_secs)?;
        override_from(&lookup, "GEMINI_PRO_THRESHOLD_CHARS", &mut llm.pro_threshold_chars)?;
        override_from(&lookup, "GEMINI_PRO_THRESHOLD_LINES", &mut llm.pro_threshold_lines)?;
        Ok(())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be within 0..=1, got {v}")))
            }
        };
        unit("classifier.similarity_threshold", self.classifier.similarity_threshold)?;
        for o in &self.classifier.overrides {
            if let Some(s) = o.similarity_threshold {
                unit("classifier.overrides.similarity_threshold", s)?;
            }
            if let Some(r) = o.token_ratio_threshold {
                if r < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "token_ratio_threshold for .{} must not be negative",
                        o.extension
                    )));
                }
            }
        }
        if self.classifier.token_ratio_threshold < 0.0 {
            return Err(ConfigError::Invalid(
                "classifier.token_ratio_threshold must not be negative".to_string(),
            ));
        }
        if self.llm.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "llm.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.llm.requests_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "llm.requests_per_minute must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn resolve(root: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

fn override_from<F, T>(lookup: &F, var: &str, slot: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(var) else {
        return Ok(());
    };
    *slot = raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: raw.clone(),
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `<root>/.transync/config.yaml`.
///
/// A missing file yields [`Config::default`]; malformed YAML yields
/// [`ConfigError::Parse`] carrying the path.
pub fn load_at(root: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(root);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// Save atomically: write `config.yaml.tmp`, then rename.
pub fn save_at(root: &Path, config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(root);
    let dir = state_dir_at(root);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
