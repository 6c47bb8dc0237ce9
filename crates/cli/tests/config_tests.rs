//! Integration tests for configuration files
//!
//! Covers loading, saving and validation of the TOML configuration:
//! - Minimal and full files
//! - Invalid log levels and hex ids
//! - Saving into directories that do not exist yet

use cli::CliConfig;
use cli::config::TimeoutSettings;
use rawusb::DeviceFilter;
use std::fs;
use std::time::Duration;
use tempfile::tempdir;

const FULL_CONFIG: &str = r#"
[logging]
level = "debug"

[device]
vendor_id = "0x1209"
product_id = "0xA0A0"

[timeouts]
read_ms = 500
write_ms = 0
"#;

#[test]
fn test_load_full_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("rawusb.toml");
    fs::write(&path, FULL_CONFIG).unwrap();

    let config = CliConfig::load(Some(path)).unwrap();
    assert_eq!(config.logging.level, "debug");
    assert_eq!(
        config.filter().unwrap(),
        DeviceFilter::new(Some(0x1209), Some(0xa0a0))
    );
    assert_eq!(config.timeouts.read(), Some(Duration::from_millis(500)));
    assert_eq!(config.timeouts.write(), None);
}

#[test]
fn test_load_empty_config_uses_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.toml");
    fs::write(&path, "").unwrap();

    let config = CliConfig::load(Some(path)).unwrap();
    assert_eq!(config, CliConfig::default());
}

#[test]
fn test_partial_sections() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    fs::write(&path, "[timeouts]\nwrite_ms = 20\n").unwrap();

    let config = CliConfig::load(Some(path)).unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(
        config.timeouts,
        TimeoutSettings {
            read_ms: 0,
            write_ms: 20
        }
    );
}

#[test]
fn test_invalid_log_level_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[logging]\nlevel = \"chatty\"\n").unwrap();

    let err = CliConfig::load(Some(path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Invalid log level"));
}

#[test]
fn test_invalid_vendor_id_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[device]\nvendor_id = \"1209\"\n").unwrap();

    let err = CliConfig::load(Some(path)).unwrap_err();
    assert!(format!("{:#}", err).contains("vendor_id"));
}

#[test]
fn test_malformed_toml_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[logging\nlevel = ").unwrap();

    assert!(CliConfig::load(Some(path)).is_err());
}

#[test]
fn test_missing_file() {
    let dir = tempdir().unwrap();
    assert!(CliConfig::load(Some(dir.path().join("absent.toml"))).is_err());
}

#[test]
fn test_save_creates_parent_dirs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("rawusb.toml");

    let mut config = CliConfig::default();
    config.device.vendor_id = Some("0x1209".to_string());
    config.timeouts.read_ms = 42;
    config.save(&path).unwrap();

    let loaded = CliConfig::load(Some(path)).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_candidates_order() {
    let candidates = CliConfig::candidates();
    assert_eq!(candidates[0], CliConfig::default_path());
    assert_eq!(
        candidates.last().unwrap(),
        &std::path::PathBuf::from("/etc/rawusb/rawusb.toml")
    );
}
