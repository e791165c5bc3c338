//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a single TOML file. Every section is
//! optional; missing files and missing keys fall back to compiled defaults
//! with a warning, never a startup failure.
//!
//! # Root folder priority
//! 1. Command-line argument (highest priority)
//! 2. `SURYA_ROOT_FOLDER` environment variable
//! 3. TOML `root_folder`
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "SURYA_ROOT_FOLDER";

/// Environment variable pointing at the TOML config file
pub const CONFIG_PATH_ENV: &str = "SURYA_CONFIG";

/// Config file name searched under the platform config directory
pub const CONFIG_FILE_NAME: &str = "surya-audit.toml";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding records, images and reports
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub thresholds: ThresholdConfig,

    #[serde(default)]
    pub imagery: ImageryConfig,

    #[serde(default)]
    pub intake: IntakeConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Detection and decision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Imagery zoom level used for the ground scale
    pub zoom: u8,
    /// Detector inclusion floor (detections below are never seen)
    pub detect_conf: f64,
    /// Confidence a detection needs to count toward a verdict
    pub verify_conf: f64,
    /// Minimum total panel area (m²) for a verdict
    pub min_valid_area_sqm: f64,
    /// Mean central luminance (0-255) below which the image is shadowed
    pub shadow_threshold: f64,
    /// Attribution band at the image bottom, in pixels
    pub footer_height_px: f64,
    /// Frame margin treated as truncation, in pixels
    pub edge_margin_px: f64,
    /// Longest/shortest side ratio above which a box is rejected
    pub max_aspect_ratio: f64,
    /// Inner ring radius in meters
    pub zone_a_radius_m: f64,
    /// Outer ring radius in meters
    pub zone_b_radius_m: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            zoom: crate::geo::DEFAULT_ZOOM,
            detect_conf: 0.10,
            verify_conf: 0.40,
            min_valid_area_sqm: 1.0,
            shadow_threshold: 50.0,
            footer_height_px: 50.0,
            edge_margin_px: 5.0,
            max_aspect_ratio: 4.5,
            zone_a_radius_m: 5.96,
            zone_b_radius_m: 8.42,
        }
    }
}

impl ThresholdConfig {
    /// Reject threshold combinations the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detect_conf) || !(0.0..=1.0).contains(&self.verify_conf) {
            return Err(Error::Config(
                "detect_conf and verify_conf must lie in [0, 1]".to_string(),
            ));
        }
        if self.verify_conf < self.detect_conf {
            return Err(Error::Config(format!(
                "verify_conf ({}) must not be below detect_conf ({})",
                self.verify_conf, self.detect_conf
            )));
        }
        if self.zone_a_radius_m <= 0.0 || self.zone_b_radius_m <= self.zone_a_radius_m {
            return Err(Error::Config(
                "ring radii must satisfy 0 < zone_a_radius_m < zone_b_radius_m".to_string(),
            ));
        }
        if self.max_aspect_ratio < 1.0 {
            return Err(Error::Config("max_aspect_ratio must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Mapping provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageryConfig {
    pub base_url: String,
    /// `<width>x<height>`
    pub size: String,
    pub map_type: String,
    /// API key; `SURYA_MAPS_API_KEY` takes priority
    pub maps_api_key: Option<String>,
}

impl Default for ImageryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com/maps/api/staticmap".to_string(),
            size: "640x640".to_string(),
            map_type: "satellite".to_string(),
            maps_api_key: None,
        }
    }
}

/// What to do when a site id has no coordinate row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingCoordinatePolicy {
    /// Substitute the fallback location and mark the record
    Warn,
    /// Skip the site
    Reject,
}

/// Coordinate intake settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub missing_coordinate_policy: MissingCoordinatePolicy,
    pub fallback_lat: f64,
    pub fallback_lon: f64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            missing_coordinate_policy: MissingCoordinatePolicy::Warn,
            fallback_lat: 20.5937,
            fallback_lon: 78.9629,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5731".to_string(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load configuration, degrading to defaults when no file exists
    ///
    /// Returns the file that was read, if any. Nothing is logged here since
    /// this runs before the subscriber is installed. A file that exists but
    /// cannot be parsed is an error.
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let Some(path) = locate_config_file(cli_path).filter(|p| p.exists()) else {
            return Ok((Self::default(), None));
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok((config, Some(path)))
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.thresholds.validate()?;
        Ok(config)
    }
}

/// Config file location: CLI path, then `SURYA_CONFIG`, then the platform config dir
pub fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("suryanetra").join(CONFIG_FILE_NAME))
        .filter(|p| p.exists())
}

/// Resolve the root folder following the documented priority order
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("suryanetra"))
        .unwrap_or_else(|| PathBuf::from("./suryanetra_data"))
}

/// Directory layout under the root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootLayout {
    pub root: PathBuf,
}

impl RootLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// One JSON document per sample
    pub fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    /// Source rooftop images (`<sample_id>.png|jpg`)
    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    /// Detector output sidecars (`<sample_id>.json`)
    pub fn detections_dir(&self) -> PathBuf {
        self.root.join("detections")
    }

    pub fn citizen_uploads_dir(&self) -> PathBuf {
        self.root.join("citizen_uploads")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    /// Annotated overlay images (`<sample_id>_audit.jpg`)
    pub fn audits_dir(&self) -> PathBuf {
        self.root.join("audits")
    }

    pub fn coordinates_csv(&self) -> PathBuf {
        self.root.join("input").join("coordinates.csv")
    }

    /// Create every directory of the layout if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.records_dir(),
            self.images_dir(),
            self.detections_dir(),
            self.citizen_uploads_dir(),
            self.reports_dir(),
            self.audits_dir(),
            self.root.join("input"),
        ] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                info!(path = %dir.display(), "Created directory");
            }
        }
        Ok(())
    }
}
