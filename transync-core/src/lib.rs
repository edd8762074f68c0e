//! transync core library — domain types, configuration, errors.
//!
//! - [`types`] — edit script, actions and manifest records
//! - [`config`] — `.transync/config.yaml` load / save
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, MinorThresholds};
pub use error::ConfigError;
pub use types::{
    ActionKind, ChangeSummary, DocPath, EditOperation, EditScript, LineRange, Manifest,
    ManifestEntry, OpKind, RevisionId, SyncStrategy, TranslationAction,
};
