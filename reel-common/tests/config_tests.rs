//! Configuration resolution and graceful degradation tests
//!
//! Covers:
//! - Missing config files never abort start-up (defaults + warning)
//! - Priority order: CLI argument > environment variable > platform file > defaults
//!
//! Tests that manipulate REEL_CONFIG are marked with #[serial] so they do not
//! race each other on the process environment.

use reel_common::config::{ConfigResolver, TomlConfig, CONFIG_ENV_VAR};
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create config file");
    file.write_all(body.as_bytes()).expect("write config file");
    path
}

#[test]
fn test_missing_file_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("does-not-exist.toml");

    let config = TomlConfig::load(&missing).expect("missing file must not be fatal");
    assert_eq!(config, TomlConfig::default());
}

#[test]
fn test_load_reads_all_sections() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "reel.toml",
        r#"
        [engine]
        tick_interval_us = 20000
        full_rate = false
        frame_limit = 250

        [buffers]
        count = 6
        preferred_format = "bgra8"
        fallback_formats = ["rgba8", "rgb565"]
        ignore_missing_fallback = true

        [logging]
        level = "debug"
        "#,
    );

    let config = TomlConfig::load(&path).unwrap();
    assert_eq!(config.engine.tick_interval_us, 20_000);
    assert!(!config.engine.full_rate);
    assert_eq!(config.engine.frame_limit, Some(250));
    assert_eq!(config.buffers.count, 6);
    assert_eq!(config.buffers.preferred_format, "bgra8");
    assert_eq!(config.buffers.fallback_formats.len(), 2);
    assert!(config.buffers.ignore_missing_fallback);
    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_cli_argument_wins_over_environment() {
    let dir = TempDir::new().unwrap();
    let cli_path = write_config(&dir, "cli.toml", "[buffers]\ncount = 5\n");
    let env_path = write_config(&dir, "env.toml", "[buffers]\ncount = 7\n");
    env::set_var(CONFIG_ENV_VAR, &env_path);

    let resolver = ConfigResolver::new("reel-test");
    assert_eq!(resolver.resolve(Some(&cli_path)), Some(cli_path.clone()));
    assert_eq!(resolver.load(Some(&cli_path)).unwrap().buffers.count, 5);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_environment_variable_used_without_cli_argument() {
    let dir = TempDir::new().unwrap();
    let env_path = write_config(&dir, "env.toml", "[buffers]\ncount = 7\n");
    env::set_var(CONFIG_ENV_VAR, &env_path);

    let resolver = ConfigResolver::new("reel-test");
    assert_eq!(resolver.resolve(None), Some(env_path));
    assert_eq!(resolver.load(None).unwrap().buffers.count, 7);

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_custom_environment_variable() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "custom.toml", "[engine]\npause_poll_ms = 3\n");
    env::set_var("REEL_TEST_CUSTOM_CONFIG", &path);

    let resolver = ConfigResolver::new("reel-test").with_env_var("REEL_TEST_CUSTOM_CONFIG");
    assert_eq!(resolver.load(None).unwrap().engine.pause_poll_ms, 3);

    env::remove_var("REEL_TEST_CUSTOM_CONFIG");
}

#[test]
#[serial]
fn test_no_sources_uses_compiled_defaults() {
    env::remove_var(CONFIG_ENV_VAR);

    // An application name nobody has a config directory for
    let resolver = ConfigResolver::new("reel-test-nonexistent-app-7f3a");
    assert_eq!(resolver.resolve(None), None);
    assert_eq!(resolver.load(None).unwrap(), TomlConfig::default());
}
