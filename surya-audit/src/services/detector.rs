//! Detector seam
//!
//! The object detector is an external model. The pipeline only needs
//! `(box, confidence)` pairs at or above a confidence floor, so any model can
//! sit behind [`Detector`].

use std::path::PathBuf;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::RawDetection;

/// Detector errors
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("No detector output for {0}")]
    MissingOutput(String),

    #[error("Detector output unreadable: {0}")]
    Io(#[from] std::io::Error),

    #[error("Detector output malformed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What the detector sees for one site
#[derive(Debug, Clone, Copy)]
pub struct DetectorInput<'a> {
    pub sample_id: &'a str,
    pub image: &'a DynamicImage,
}

/// Black-box object detector
///
/// Implementations must be deterministic for a given input and must not
/// return detections below `confidence_floor`.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn infer(
        &self,
        input: DetectorInput<'_>,
        confidence_floor: f64,
    ) -> Result<Vec<RawDetection>, DetectorError>;
}

/// Reads `<dir>/<sample_id>.json` written by an out-of-process model run
///
/// File format: `[{"bbox": [x1, y1, x2, y2], "confidence": 0.87}, ...]`
#[derive(Debug, Clone)]
pub struct SidecarDetector {
    dir: PathBuf,
}

impl SidecarDetector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, sample_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sample_id))
    }
}

impl Detector for SidecarDetector {
    fn name(&self) -> &str {
        "sidecar"
    }

    fn infer(
        &self,
        input: DetectorInput<'_>,
        confidence_floor: f64,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        let path = self.path_for(input.sample_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DetectorError::MissingOutput(input.sample_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let raw: Vec<RawDetection> = serde_json::from_str(&content)?;
        let total = raw.len();
        let kept = apply_floor(raw, confidence_floor, input.sample_id);
        debug!(
            sample_id = %input.sample_id,
            total,
            kept = kept.len(),
            floor = confidence_floor,
            "Sidecar detections loaded"
        );
        Ok(kept)
    }
}

/// Fixed output regardless of the image
#[derive(Debug, Clone, Default)]
pub struct StaticDetector {
    detections: Vec<RawDetection>,
}

impl StaticDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }
}

impl Detector for StaticDetector {
    fn name(&self) -> &str {
        "static"
    }

    fn infer(
        &self,
        input: DetectorInput<'_>,
        confidence_floor: f64,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        Ok(apply_floor(self.detections.clone(), confidence_floor, input.sample_id))
    }
}

/// Drop detections below the floor and any with a confidence outside [0, 1]
fn apply_floor(raw: Vec<RawDetection>, floor: f64, sample_id: &str) -> Vec<RawDetection> {
    raw.into_iter()
        .filter(|d| {
            if !(0.0..=1.0).contains(&d.confidence) {
                warn!(sample_id = %sample_id, confidence = d.confidence, "Ignoring out-of-range confidence");
                return false;
            }
            d.confidence >= floor
        })
        .collect()
}
