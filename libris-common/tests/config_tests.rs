//! Unit tests for bootstrap configuration
//!
//! Uses serial_test: tests touching LIBRIS_DATA_FOLDER run sequentially.

use libris_common::config::{
    database_path, load_toml_config, resolve_data_folder, TomlConfig, DATA_FOLDER_ENV,
};
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
fn test_missing_toml_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let config = load_toml_config(&temp_dir.path().join("absent.toml")).unwrap();

    assert_eq!(config.port, 5780);
    assert_eq!(config.bind_address, "127.0.0.1");
    assert_eq!(config.logging.level, "info");
    assert!(config.data_folder.is_none());
}

#[test]
fn test_partial_toml_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "port = 9000\n[logging]\nlevel = \"debug\"\n").unwrap();

    let config = load_toml_config(&path).unwrap();

    assert_eq!(config.port, 9000);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.bind_address, "127.0.0.1");
}

#[test]
fn test_invalid_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(&path, "port = \"not a number\"").unwrap();

    let err = load_toml_config(&path).unwrap_err();
    assert!(matches!(err, libris_common::Error::Config(_)));
}

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(DATA_FOLDER_ENV, "/from/env");
    let toml = TomlConfig {
        data_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let resolved = resolve_data_folder(Some(Path::new("/from/cli")), DATA_FOLDER_ENV, &toml);
    env::remove_var(DATA_FOLDER_ENV);

    assert_eq!(resolved, PathBuf::from("/from/cli"));
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(DATA_FOLDER_ENV, "/from/env");
    let toml = TomlConfig {
        data_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };

    let resolved = resolve_data_folder(None, DATA_FOLDER_ENV, &toml);
    env::remove_var(DATA_FOLDER_ENV);

    assert_eq!(resolved, PathBuf::from("/from/env"));
}

#[test]
#[serial]
fn test_toml_then_default() {
    env::remove_var(DATA_FOLDER_ENV);
    let toml = TomlConfig {
        data_folder: Some(PathBuf::from("/from/toml")),
        ..TomlConfig::default()
    };
    assert_eq!(
        resolve_data_folder(None, DATA_FOLDER_ENV, &toml),
        PathBuf::from("/from/toml")
    );

    let fallback = resolve_data_folder(None, DATA_FOLDER_ENV, &TomlConfig::default());
    assert!(fallback.to_string_lossy().contains("libris"));
    assert!(database_path(&fallback).ends_with("libris.db"));
}
