//! Error types for transync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, read-only directory, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with file path and serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An environment override was set but could not be parsed.
    #[error("invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: String, value: String },

    /// A setting is out of its allowed range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
