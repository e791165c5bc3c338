//! Unit tests for configuration and graceful degradation
//!
//! Tests:
//! - Missing TOML files SHALL NOT cause termination
//! - Partial TOML files fill the rest from compiled defaults
//! - Priority order for root folder resolution
//! - Threshold validation
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate SURYA_ROOT_FOLDER or SURYA_CONFIG are marked with #[serial].

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use surya_common::config::{
    resolve_root_folder, MissingCoordinatePolicy, RootLayout, ThresholdConfig, TomlConfig,
    CONFIG_PATH_ENV, ROOT_FOLDER_ENV,
};
use surya_common::Error;

#[test]
fn test_threshold_defaults() {
    let t = ThresholdConfig::default();
    assert_eq!(t.zoom, 20);
    assert_eq!(t.detect_conf, 0.10);
    assert_eq!(t.verify_conf, 0.40);
    assert_eq!(t.min_valid_area_sqm, 1.0);
    assert_eq!(t.shadow_threshold, 50.0);
    assert_eq!(t.footer_height_px, 50.0);
    assert_eq!(t.edge_margin_px, 5.0);
    assert_eq!(t.max_aspect_ratio, 4.5);
    assert_eq!(t.zone_a_radius_m, 5.96);
    assert_eq!(t.zone_b_radius_m, 8.42);
    t.validate().unwrap();
}

#[test]
fn test_partial_toml_uses_defaults_for_rest() {
    let config = TomlConfig::from_toml_str(
        r#"
        root_folder = "/srv/surya"

        [thresholds]
        verify_conf = 0.55

        [intake]
        missing_coordinate_policy = "reject"
        "#,
    )
    .unwrap();

    assert_eq!(config.root_folder, Some(PathBuf::from("/srv/surya")));
    assert_eq!(config.thresholds.verify_conf, 0.55);
    assert_eq!(config.thresholds.detect_conf, 0.10);
    assert_eq!(
        config.intake.missing_coordinate_policy,
        MissingCoordinatePolicy::Reject
    );
    assert_eq!(config.intake.fallback_lat, 20.5937);
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.imagery.size, "640x640");
    assert_eq!(config.server.bind, "127.0.0.1:5731");
}

#[test]
fn test_invalid_thresholds_rejected() {
    let result = TomlConfig::from_toml_str(
        r#"
        [thresholds]
        detect_conf = 0.5
        verify_conf = 0.3
        "#,
    );
    assert!(matches!(result, Err(Error::Config(_))));

    let result = TomlConfig::from_toml_str(
        r#"
        [thresholds]
        zone_a_radius_m = 9.0
        zone_b_radius_m = 8.0
        "#,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_toml_is_config_error() {
    let result = TomlConfig::from_toml_str("root_folder = [unclosed");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_missing_config_file_degrades_to_defaults() {
    env::remove_var(CONFIG_PATH_ENV);
    let (config, path) = TomlConfig::load(Some(Path::new("/nonexistent/surya-audit.toml"))).unwrap();
    assert!(path.is_none());
    assert!(config.root_folder.is_none());
    assert_eq!(config.thresholds, ThresholdConfig::default());
}

#[test]
#[serial]
fn test_config_path_from_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("surya-audit.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

    env::set_var(CONFIG_PATH_ENV, &path);
    let (config, loaded_from) = TomlConfig::load(None).unwrap();
    env::remove_var(CONFIG_PATH_ENV);

    assert_eq!(config.logging.level, "debug");
    assert_eq!(loaded_from, Some(path));
}

#[test]
#[serial]
fn test_root_folder_cli_wins() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/surya-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/surya-toml")),
        ..Default::default()
    };

    let root = resolve_root_folder(Some(Path::new("/tmp/surya-cli")), &config);
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, PathBuf::from("/tmp/surya-cli"));
}

#[test]
#[serial]
fn test_root_folder_env_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/surya-env");
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/surya-toml")),
        ..Default::default()
    };

    let root = resolve_root_folder(None, &config);
    env::remove_var(ROOT_FOLDER_ENV);

    assert_eq!(root, PathBuf::from("/tmp/surya-env"));
}

#[test]
#[serial]
fn test_root_folder_toml_then_default() {
    env::remove_var(ROOT_FOLDER_ENV);
    let config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/surya-toml")),
        ..Default::default()
    };
    assert_eq!(
        resolve_root_folder(None, &config),
        PathBuf::from("/tmp/surya-toml")
    );

    let fallback = resolve_root_folder(None, &TomlConfig::default());
    assert!(!fallback.as_os_str().is_empty());
}

#[test]
fn test_layout_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let layout = RootLayout::new(dir.path().join("root"));
    layout.ensure_directories().unwrap();

    assert!(layout.records_dir().is_dir());
    assert!(layout.images_dir().is_dir());
    assert!(layout.detections_dir().is_dir());
    assert!(layout.citizen_uploads_dir().is_dir());
    assert!(layout.reports_dir().is_dir());
    assert!(layout.audits_dir().is_dir());
    assert!(layout.coordinates_csv().parent().unwrap().is_dir());

    // Idempotent
    layout.ensure_directories().unwrap();
}
