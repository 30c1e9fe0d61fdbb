//! Configuration resolution tests
//!
//! Tests that touch SEGUE_CONFIG are marked #[serial] so they do not race on
//! the process environment.

use segue_common::config::{SegueConfig, CONFIG_ENV_VAR};
use segue_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content.as_bytes()).expect("write temp file");
    file
}

#[test]
#[serial]
fn test_cli_path_takes_priority_over_env() {
    let cli = write_config("[playback]\nframe_budget = 2048\n");
    let from_env = write_config("[playback]\nframe_budget = 4096\n");
    env::set_var(CONFIG_ENV_VAR, from_env.path());

    let config = SegueConfig::resolve(Some(cli.path())).expect("load cli config");
    assert_eq!(config.playback.frame_budget, 2048);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_path_is_used() {
    let from_env = write_config(
        r#"
        [output]
        sample_rate = 96000

        [logging]
        level = "debug"
        "#,
    );
    env::set_var(CONFIG_ENV_VAR, from_env.path());

    let config = SegueConfig::resolve(None).expect("load env config");
    assert_eq!(config.output.sample_rate, 96000);
    assert_eq!(config.output.channels, 2);
    assert_eq!(config.logging.level, "debug");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_missing_file_is_an_error() {
    env::remove_var(CONFIG_ENV_VAR);
    let result = SegueConfig::resolve(Some(std::path::Path::new(
        "/nonexistent/segue/config.toml",
    )));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let file = write_config("[output]\nchannels = 0\n");
    let result = SegueConfig::load(file.path());
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_log_file_round_trips_through_toml() {
    let file = write_config("[logging]\nlevel = \"warn\"\nfile = \"/tmp/segue.log\"\n");
    let config = SegueConfig::load(file.path()).expect("load");
    assert_eq!(config.logging.level, "warn");
    assert_eq!(
        config.logging.file.as_deref(),
        Some(std::path::Path::new("/tmp/segue.log"))
    );
}
