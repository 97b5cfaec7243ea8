//! Configuration layering tests.
//!
//! Covers the shipped example file, environment overrides, CLI overrides on
//! top of both, and validation failures surfaced through the daemon.

use std::env;

use clap::Parser;
use serial_test::serial;

use cdrflow_core::config::{CdrflowConfig, LogGeneration, SinkMode};
use cdrflow_daemon::{DaemonCli, Orchestrator};

const EXAMPLE: &str = include_str!("../../cdrflow.toml.example");

#[test]
fn test_example_config_parses_and_validates() {
    // Given: the example config shipped at the repository root
    // When: parsing it
    let config = CdrflowConfig::parse(EXAMPLE).expect("example config should parse");

    // Then: every section is populated and valid
    config.validate().expect("example config should validate");
    assert_eq!(config.ingest.drop_dir, "/var/spool/cdrflow/new");
    assert_eq!(config.ingest.log_generation, LogGeneration::Current);
    assert_eq!(config.ingest.settle_ms, 500);
    assert_eq!(config.sink.mode, SinkMode::Persist);
    assert_eq!(config.sink.table, "tb_cdr");
    assert!(config.sink.idempotent);
    assert!(!config.metrics.enabled);
}

#[test]
fn test_partial_config_falls_back_to_defaults() {
    let config = CdrflowConfig::parse(
        r#"
[ingest]
drop_dir = "/srv/new"
log_generation = "legacy"
"#,
    )
    .expect("partial config should parse");

    assert_eq!(config.ingest.drop_dir, "/srv/new");
    assert_eq!(config.ingest.work_dir, "./tmp");
    assert_eq!(config.ingest.log_generation, LogGeneration::Legacy);
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.sink.database_path, "./cdr.db");
}

#[test]
fn test_unknown_generation_is_a_parse_error() {
    let result = CdrflowConfig::parse("[ingest]\nlog_generation = \"v3\"\n");
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    // Given: a parsed file and env overrides
    let mut config = CdrflowConfig::parse(EXAMPLE).expect("example config should parse");
    // SAFETY: serialized test, variables removed below
    unsafe {
        env::set_var("CDRFLOW_INGEST_DROP_DIR", "/env/new");
        env::set_var("CDRFLOW_SINK_MODE", "echo");
        env::set_var("CDRFLOW_INGEST_SETTLE_MS", "250");
    }

    // When: applying env overrides
    config.apply_env_overrides();

    // SAFETY: cleanup
    unsafe {
        env::remove_var("CDRFLOW_INGEST_DROP_DIR");
        env::remove_var("CDRFLOW_SINK_MODE");
        env::remove_var("CDRFLOW_INGEST_SETTLE_MS");
    }

    // Then: env values replace file values
    assert_eq!(config.ingest.drop_dir, "/env/new");
    assert_eq!(config.sink.mode, SinkMode::Echo);
    assert_eq!(config.ingest.settle_ms, 250);
    assert_eq!(config.ingest.work_dir, "/var/spool/cdrflow/tmp");
}

#[test]
#[serial]
fn test_invalid_env_value_is_ignored() {
    let mut config = CdrflowConfig::default();
    // SAFETY: serialized test
    unsafe {
        env::set_var("CDRFLOW_INGEST_SETTLE_MS", "soon");
    }
    config.apply_env_overrides();
    // SAFETY: cleanup
    unsafe {
        env::remove_var("CDRFLOW_INGEST_SETTLE_MS");
    }

    assert_eq!(config.ingest.settle_ms, 500);
}

#[test]
#[serial]
fn test_cli_wins_over_env() {
    let mut config = CdrflowConfig::parse(EXAMPLE).expect("example config should parse");
    // SAFETY: serialized test
    unsafe {
        env::set_var("CDRFLOW_INGEST_DROP_DIR", "/env/new");
        env::set_var("CDRFLOW_GENERAL_LOG_LEVEL", "warn");
    }
    config.apply_env_overrides();
    // SAFETY: cleanup
    unsafe {
        env::remove_var("CDRFLOW_INGEST_DROP_DIR");
        env::remove_var("CDRFLOW_GENERAL_LOG_LEVEL");
    }

    let cli = DaemonCli::try_parse_from(["cdrflow", "--drop-dir", "/cli/new"])
        .expect("cli should parse");
    cli.apply_overrides(&mut config);

    assert_eq!(config.ingest.drop_dir, "/cli/new");
    assert_eq!(config.general.log_level, "warn");
}

#[test]
fn test_orchestrator_rejects_invalid_config() {
    // Given: drop and work directories that collide
    let mut config = CdrflowConfig::default();
    config.ingest.work_dir = config.ingest.drop_dir.clone();

    // When: building the daemon
    let result = Orchestrator::build_from_config(config);

    // Then: validation fails before any sink is opened
    let err = result.err().expect("colliding directories must be rejected");
    assert!(err.to_string().contains("ingest.drop_dir"), "got: {err}");
}

#[test]
fn test_orchestrator_rejects_bad_table_name() {
    let mut config = CdrflowConfig::default();
    config.sink.table = "cdr; drop table x".to_owned();

    let err = Orchestrator::build_from_config(config)
        .err()
        .expect("table name must be an identifier");
    assert!(err.to_string().contains("sink.table"), "got: {err}");
}

#[tokio::test]
async fn test_build_reports_missing_file() {
    let err = Orchestrator::build(std::path::Path::new("/nonexistent/cdrflow.toml"))
        .await
        .err()
        .expect("missing file must fail");
    assert!(err.to_string().contains("/nonexistent/cdrflow.toml"));
}
