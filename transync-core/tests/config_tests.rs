//! Integration tests for `transync_core::config` and manifest serialisation.

use assert_fs::prelude::*;
use chrono::Utc;
use predicates::prelude::predicate;
use rstest::rstest;
use std::collections::BTreeMap;

use transync_core::config::{self, Config, StyleGuideOverride};
use transync_core::types::{DocPath, Manifest, ManifestEntry, RevisionId, SyncStrategy};

#[test]
fn save_creates_state_dir_and_file() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(root.path(), &Config::default()).expect("save");

    root.child(".transync").assert(predicate::path::is_dir());
    root.child(".transync/config.yaml")
        .assert(predicate::str::contains("similarity_threshold"));
    root.child(".transync/config.yaml.tmp")
        .assert(predicate::path::missing());
}

#[test]
fn style_guide_overrides_survive_roundtrip() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let mut cfg = Config::default();
    cfg.llm.style_guide = Some("STYLE_GUIDE.md".into());
    cfg.llm.style_guide_overrides.push(StyleGuideOverride {
        path_prefix: "docs/releases/".to_string(),
        file: "RELEASES_STYLE.md".into(),
    });
    config::save_at(root.path(), &cfg).expect("save");

    let loaded = config::load_at(root.path()).expect("load");
    assert_eq!(loaded.llm.style_guide_overrides.len(), 1);
    assert_eq!(loaded.llm.style_guide_overrides[0].path_prefix, "docs/releases/");
}

#[test]
fn empty_config_file_is_treated_as_defaults() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child(".transync/config.yaml")
        .write_str("")
        .expect("write");
    assert_eq!(config::load_at(root.path()).expect("load"), Config::default());
}

#[rstest]
#[case::keep(SyncStrategy::KeepExisting, "keep_existing")]
#[case::baseline(SyncStrategy::Baseline, "baseline")]
#[case::full(SyncStrategy::FullTranslation, "full_translation")]
#[case::retranslate(SyncStrategy::Retranslate, "retranslate")]
fn manifest_strategy_names_on_disk(#[case] strategy: SyncStrategy, #[case] expected: &str) {
    let mut manifest = Manifest::default();
    manifest.files.insert(
        DocPath::from("docs/index.md"),
        ManifestEntry {
            baseline_revision: RevisionId::from("abc123"),
            strategy,
            last_synced_at: Utc::now(),
            metadata: BTreeMap::new(),
        },
    );
    let json = serde_json::to_string(&manifest).expect("serialize");
    assert!(json.contains(&format!("\"strategy\":\"{expected}\"")), "{json}");
    assert_eq!(strategy.to_string(), expected);
}
