use std::io::Write;

use smart_crossing::{CrossingError, SimConfig};
use tempfile::NamedTempFile;

fn toml_file(body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn file_overrides_are_layered_over_defaults() {
    let file = toml_file(
        r#"
[signal]
min_green_ticks = 100

[policy]
enabled = false
"#,
    );

    let cfg = SimConfig::load(Some(file.path())).unwrap();
    let defaults = SimConfig::default();

    assert_eq!(cfg.signal.min_green_ticks, 100);
    assert!(!cfg.policy.enabled);
    assert_eq!(cfg.signal.yellow_ticks, defaults.signal.yellow_ticks);
    assert_eq!(cfg.vehicle.max_speed, defaults.vehicle.max_speed);
}

#[test]
fn invalid_values_are_rejected_at_load() {
    let file = toml_file(
        r#"
[policy]
replay_capacity = 4
batch_size = 16
"#,
    );

    let err = SimConfig::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, CrossingError::InvalidConfig(_)));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = SimConfig::load(Some(std::path::Path::new("/nonexistent/crossing.toml"))).unwrap_err();
    assert!(matches!(err, CrossingError::Config(_)));
}

#[test]
fn defaults_load_without_a_file() {
    let cfg = SimConfig::load(None).unwrap();
    assert!(cfg.validate().is_ok());
}
