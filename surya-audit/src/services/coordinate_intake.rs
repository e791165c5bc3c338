//! Coordinate intake
//!
//! Reads the `sample_id, latitude, longitude` table. Extra columns are
//! ignored, duplicate ids keep the last row, and rows with unparseable or
//! non-finite coordinates are skipped with a warning.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use surya_common::config::{IntakeConfig, MissingCoordinatePolicy};
use thiserror::Error;
use tracing::warn;

/// Note appended to a verdict evaluated at the fallback location
pub const NOTE_FALLBACK_COORDINATES: &str = "Coordinates missing - fallback location used";

/// Coordinate intake errors
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Failed to read coordinate table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Coordinate table is missing column '{0}'")]
    MissingColumn(&'static str),

    #[error("No coordinates for {0}")]
    MissingCoordinates(String),
}

#[derive(Debug, Deserialize)]
struct CoordinateRow {
    sample_id: String,
    latitude: String,
    longitude: String,
}

/// Resolved location for one site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SiteLocation {
    pub lat: f64,
    pub lon: f64,
    /// Location came from the fallback, not the table
    pub fallback: bool,
}

/// Deduplicated coordinate lookup
#[derive(Debug, Clone, Default)]
pub struct CoordinateTable {
    /// Insertion order of first appearance
    order: Vec<String>,
    coords: HashMap<String, (f64, f64)>,
}

impl CoordinateTable {
    pub fn from_path(path: &Path) -> Result<Self, IntakeError> {
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
        Self::from_csv(reader)
    }

    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, IntakeError> {
        let reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
        Self::from_csv(reader)
    }

    fn from_csv<R: Read>(mut reader: csv::Reader<R>) -> Result<Self, IntakeError> {
        let headers = reader.headers()?.clone();
        for column in ["sample_id", "latitude", "longitude"] {
            if !headers.iter().any(|h| h == column) {
                return Err(IntakeError::MissingColumn(column));
            }
        }

        let mut table = Self::default();
        for (line, row) in reader.deserialize::<CoordinateRow>().enumerate() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(row = line + 1, error = %e, "Skipping malformed coordinate row");
                    continue;
                }
            };

            let parsed = row
                .latitude
                .parse::<f64>()
                .ok()
                .zip(row.longitude.parse::<f64>().ok())
                .filter(|(lat, lon)| lat.is_finite() && lon.is_finite());
            let Some((lat, lon)) = parsed else {
                warn!(
                    sample_id = %row.sample_id,
                    latitude = %row.latitude,
                    longitude = %row.longitude,
                    "Skipping row with invalid coordinates"
                );
                continue;
            };
            if row.sample_id.is_empty() {
                warn!(row = line + 1, "Skipping row without sample_id");
                continue;
            }

            table.insert(row.sample_id, lat, lon);
        }
        Ok(table)
    }

    /// Insert or replace; later rows win
    pub fn insert(&mut self, sample_id: impl Into<String>, lat: f64, lon: f64) {
        let sample_id = sample_id.into();
        if let Some(previous) = self.coords.insert(sample_id.clone(), (lat, lon)) {
            warn!(
                sample_id = %sample_id,
                previous_lat = previous.0,
                previous_lon = previous.1,
                lat,
                lon,
                "Duplicate coordinate row, keeping latest"
            );
        } else {
            self.order.push(sample_id);
        }
    }

    pub fn get(&self, sample_id: &str) -> Option<(f64, f64)> {
        self.coords.get(sample_id).copied()
    }

    /// Sample ids in order of first appearance
    pub fn sample_ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Location for `sample_id` under the configured missing-coordinate policy
    pub fn resolve(&self, sample_id: &str, intake: &IntakeConfig) -> Result<SiteLocation, IntakeError> {
        if let Some((lat, lon)) = self.get(sample_id) {
            return Ok(SiteLocation {
                lat,
                lon,
                fallback: false,
            });
        }

        match intake.missing_coordinate_policy {
            MissingCoordinatePolicy::Reject => {
                Err(IntakeError::MissingCoordinates(sample_id.to_string()))
            }
            MissingCoordinatePolicy::Warn => {
                warn!(
                    sample_id = %sample_id,
                    lat = intake.fallback_lat,
                    lon = intake.fallback_lon,
                    "Coordinates missing, using fallback location"
                );
                Ok(SiteLocation {
                    lat: intake.fallback_lat,
                    lon: intake.fallback_lon,
                    fallback: true,
                })
            }
        }
    }
}
