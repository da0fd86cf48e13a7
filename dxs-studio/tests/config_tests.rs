//! Configuration loading tests
//!
//! Tests touching `DXS_CONFIG` run serially.

use dxs_common::config::write_toml_config;
use dxs_common::Error;
use dxs_studio::config::{StudioConfig, CONFIG_ENV_VAR};
use serial_test::serial;
use std::time::Duration;

#[test]
#[serial]
fn test_load_from_cli_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("studio.toml");
    std::fs::write(
        &path,
        r#"
        port = 6100

        [engine]
        base_url = "http://gpu-box:8000"

        [tracker]
        poll_interval_ms = 500
        signal_timeout_ms = 10000

        [transcription]
        default_sensitivity = 0.7
        "#,
    )
    .unwrap();

    let config = StudioConfig::load(Some(&path)).unwrap();

    assert_eq!(config.port, 6100);
    assert_eq!(config.engine.base_url, "http://gpu-box:8000");
    assert_eq!(config.tracker_config().poll_interval, Duration::from_millis(500));
    assert_eq!(config.tracker_config().signal_timeout, Duration::from_secs(10));
    assert_eq!(config.transcription.default_sensitivity, 0.7);
    assert_eq!(config.transcription.noise_floor_ratio, 0.6);
}

#[test]
#[serial]
fn test_env_var_names_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("from-env.toml");
    std::fs::write(&path, "port = 6200\n").unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &path);
    let result = StudioConfig::load(None);
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(result.unwrap().port, 6200);
}

#[test]
#[serial]
fn test_cli_path_beats_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let cli_path = dir.path().join("cli.toml");
    let env_path = dir.path().join("env.toml");
    std::fs::write(&cli_path, "port = 6300\n").unwrap();
    std::fs::write(&env_path, "port = 6400\n").unwrap();

    std::env::set_var(CONFIG_ENV_VAR, &env_path);
    let result = StudioConfig::load(Some(&cli_path));
    std::env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(result.unwrap().port, 6300);
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.toml");

    let config = StudioConfig::load(Some(&path)).unwrap();

    assert_eq!(config, StudioConfig::default());
}

#[test]
#[serial]
fn test_invalid_values_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[transcription]\nnoise_floor_ratio = 1.5\n").unwrap();

    let result = StudioConfig::load(Some(&path));

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_malformed_toml_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "port = \"not a number\"\n").unwrap();

    assert!(matches!(StudioConfig::load(Some(&path)), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_written_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("dxs-studio.toml");
    let mut config = StudioConfig::default();
    config.engine.request_timeout_ms = 5_000;
    config.logging.level = "info".to_string();

    write_toml_config(&config, &path).unwrap();

    assert_eq!(StudioConfig::load(Some(&path)).unwrap(), config);
}
