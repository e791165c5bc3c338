//! # SuryaNetra Common Library
//!
//! Shared code for the rooftop solar audit service:
//! - Site record model, canonical serialization and integrity hashing
//! - Ground-resolution scale for Web-Mercator imagery
//! - Configuration loading (TOML, environment, compiled defaults)
//! - Error taxonomy

pub mod config;
pub mod error;
pub mod geo;
pub mod record;

pub use error::{Error, Result};
pub use geo::meters_per_pixel;
pub use record::{BufferZone, Detection, ImageMetadata, QcStatus, SiteRecord};
