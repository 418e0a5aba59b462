//! Run configuration loading as the CLI does it

use patfam_common::config::{resolve_config_path, ConfigSource};
use patfam_ingest::config::{IngestConfig, ProviderCredentials, RunOverrides};
use patfam_ingest::types::ProviderId;
use patfam_ingest::IngestPipeline;
use serial_test::serial;
use std::path::PathBuf;
use tempfile::TempDir;

const RUN_TOML: &str = r#"
[run]
max_pages = 3
per_page = 25
provider_priority = ["office_b", "office_a", "office_c", "manual"]

[providers.office_a]
enabled = true

[providers.office_b]
token_env = "PATFAM_TEST_OFFICE_B_TOKEN"

[providers.office_b.query]
keywords = ["\"mRNA display\"", "\"mRNA display\""]

[providers.office_c]
enabled = false

[resolver]
title_similarity_threshold = 0.9

[[taxonomy]]
label = "cyclization"
patterns = ["\\bmacrocycl"]
excluded_codes = ["A61K"]

[logging]
level = "debug"
"#;

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("ingest.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_file_sections() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, RUN_TOML);

    let source = resolve_config_path(Some(&path));
    assert_eq!(source, ConfigSource::CommandLine(path.clone()));
    let config = IngestConfig::load(&source).unwrap();

    assert_eq!(config.run.max_pages, 3);
    assert_eq!(config.run.per_page, 25);
    assert_eq!(config.enabled_offices(), vec![ProviderId::OfficeA, ProviderId::OfficeB]);
    assert_eq!(config.provider_priority().rank(ProviderId::OfficeB), 0);
    assert_eq!(config.resolver.title_similarity_threshold, 0.9);
    assert_eq!(config.taxonomy.len(), 1);
    assert_eq!(config.taxonomy[0].excluded_codes, vec!["A61K".to_string()]);
    assert_eq!(config.logging.level, "debug");
    // retry section absent: defaults
    assert_eq!(config.retry.max_attempts, 4);

    let office_b = config.providers.get(ProviderId::OfficeB).unwrap();
    let query = config.query.with_override(office_b.query.as_ref());
    assert_eq!(query.keywords, vec!["\"mRNA display\"".to_string()]);
    assert_eq!(query.cpc_prefixes, config.query.cpc_prefixes);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[run\nmax_pages = ");

    let result = IngestConfig::load(&ConfigSource::CommandLine(path));
    assert!(matches!(result, Err(patfam_common::Error::Config(_))));
}

#[test]
fn test_overrides_then_validation() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, RUN_TOML);
    let mut config = IngestConfig::load(&ConfigSource::CommandLine(path)).unwrap();

    config.apply_overrides(RunOverrides {
        max_pages: Some(1),
        dry_run: true,
        manual_path: Some(dir.path().join("missing.jsonl")),
        full_text_dir: Some(dir.path().join("fulltext")),
        ..Default::default()
    });

    assert_eq!(config.run.max_pages, 1);
    assert!(config.run.dry_run);
    assert!(config.enrichment.enabled);
    assert!(config.validate().is_err());
    assert!(IngestPipeline::from_config(config).is_err());
}

#[test]
fn test_no_provider_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[providers.office_a]
enabled = false
[providers.office_b]
enabled = false
[providers.office_c]
enabled = false
"#,
    );
    let config = IngestConfig::load(&ConfigSource::CommandLine(path)).unwrap();

    assert!(matches!(
        IngestPipeline::from_config(config),
        Err(patfam_common::Error::Config(_))
    ));
}

#[test]
#[serial]
fn test_credentials_read_from_named_variable() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, RUN_TOML);
    let config = IngestConfig::load(&ConfigSource::CommandLine(path)).unwrap();
    let office_b = config.providers.get(ProviderId::OfficeB).unwrap();

    std::env::set_var("PATFAM_TEST_OFFICE_B_TOKEN", "secret-token");
    let credentials = ProviderCredentials::from_env(ProviderId::OfficeB, office_b);
    assert_eq!(credentials.token.as_deref(), Some("secret-token"));

    std::env::set_var("PATFAM_TEST_OFFICE_B_TOKEN", "   ");
    let credentials = ProviderCredentials::from_env(ProviderId::OfficeB, office_b);
    assert!(credentials.token.is_none());

    std::env::remove_var("PATFAM_TEST_OFFICE_B_TOKEN");
}

#[tokio::test]
#[serial]
async fn test_pipeline_builds_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, RUN_TOML);
    let config = IngestConfig::load(&ConfigSource::CommandLine(path)).unwrap();

    let pipeline = IngestPipeline::from_config(config).unwrap();
    assert_eq!(pipeline.config().run.per_page, 25);
}
