use courier_core::config::{ConfigManager, ConfigurationError};
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_base_file_overlay_and_environment_are_layered() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let base = write(
        &dir,
        "courier.yaml",
        r#"
queue_buffer_size: 500
stop_timeout_ms: 5000
alerts:
  default_subject: "Base subject"
retry:
  retry_interval_ms: 2500
"#,
    );
    write(
        &dir,
        "courier.staging.yaml",
        r#"
queue_buffer_size: 50
alerts:
  default_subject: "Staging alert"
"#,
    );

    std::env::set_var("COURIER_LAYER_TEST__STOP_TIMEOUT_MS", "750");
    std::env::set_var("COURIER_LAYER_TEST__RETRY__RETRY_COUNT", "4");
    let manager = ConfigManager::load_with_prefix(&base, "staging", "COURIER_LAYER_TEST");
    std::env::remove_var("COURIER_LAYER_TEST__STOP_TIMEOUT_MS");
    std::env::remove_var("COURIER_LAYER_TEST__RETRY__RETRY_COUNT");
    let manager = manager?;

    let config = manager.config();
    assert_eq!(manager.environment(), "staging");
    assert_eq!(config.queue_buffer_size, 50, "overlay wins over base");
    assert_eq!(config.alerts.default_subject, "Staging alert");
    assert_eq!(config.stop_timeout_ms, 750, "environment wins over files");
    assert_eq!(config.retry.retry_interval_ms, 2500);
    assert_eq!(config.retry.retry_count, 4);
    assert!(config.clear_global_map, "unset fields keep their defaults");
    assert_eq!(manager.source_path(), Some(base.as_path()));
    Ok(())
}

#[test]
fn test_missing_overlay_is_optional() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let base = write(&dir, "engine.toml", "queue_buffer_size = 12\n");

    let manager = ConfigManager::load_with_prefix(&base, "production", "COURIER_NO_OVERLAY_TEST")?;
    assert_eq!(manager.config().queue_buffer_size, 12);
    assert_eq!(manager.config().environment, "production");
    Ok(())
}

#[test]
fn test_invalid_values_fail_loading() {
    let dir = TempDir::new().unwrap();
    let base = write(&dir, "courier.yaml", "queue_buffer_size: 0\n");

    let err = ConfigManager::load_with_prefix(&base, "test", "COURIER_INVALID_TEST").unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }), "got {err:?}");
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let base = write(&dir, "courier.yaml", "queue_buffer_size: [not, a, number\n");

    let err = ConfigManager::load_with_prefix(&base, "test", "COURIER_MALFORMED_TEST").unwrap_err();
    assert!(matches!(err, ConfigurationError::ParseError { .. }), "got {err:?}");
}

#[test]
fn test_missing_base_file() {
    let dir = TempDir::new().unwrap();
    let err = ConfigManager::load_with_prefix(dir.path().join("absent.yaml"), "test", "COURIER_ABSENT_TEST")
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
}
