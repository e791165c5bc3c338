//! Per-site evaluation pipeline
//!
//! image + raw detections + latitude → scale → admissible candidates →
//! buffer zone → quality → verdict. Everything here is synchronous and free of
//! I/O apart from the detector call; the batch runner drives it under
//! `spawn_blocking`.

use chrono::Utc;
use image::DynamicImage;
use surya_common::config::ThresholdConfig;
use surya_common::{meters_per_pixel, BufferZone, ImageMetadata, SiteRecord};
use tracing::{debug, info, warn};

use crate::models::{Candidate, RawDetection};
use crate::services::coordinate_intake::SiteLocation;
use crate::services::decision_engine::{DecisionEngine, Verdict};
use crate::services::detector::{Detector, DetectorError, DetectorInput};
use crate::services::quality_gate::{QualityAssessment, QualityGate};
use crate::services::zone_classifier::{image_center, ZoneClassifier};
use crate::services::CandidateFilter;

/// Everything one evaluation produced
#[derive(Debug, Clone, PartialEq)]
pub struct SiteEvaluation {
    /// Meters per pixel used for areas and ring radii
    pub scale: f64,
    pub candidates: Vec<Candidate>,
    pub zone: BufferZone,
    pub quality: QualityAssessment,
    pub verdict: Verdict,
}

/// Configured evaluation stages
#[derive(Debug, Clone)]
pub struct SitePipeline {
    zoom: u8,
    detect_conf: f64,
    filter: CandidateFilter,
    zones: ZoneClassifier,
    gate: QualityGate,
    engine: DecisionEngine,
}

impl SitePipeline {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            zoom: thresholds.zoom,
            detect_conf: thresholds.detect_conf,
            filter: CandidateFilter::from_thresholds(thresholds),
            zones: ZoneClassifier::from_thresholds(thresholds),
            gate: QualityGate::from_thresholds(thresholds),
            engine: DecisionEngine::from_thresholds(thresholds),
        }
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Raw inclusion threshold handed to the detector
    pub fn confidence_floor(&self) -> f64 {
        self.detect_conf
    }

    /// Evaluate already-detected boxes against `image`
    pub fn evaluate(&self, image: &DynamicImage, raw: &[RawDetection], lat: f64) -> SiteEvaluation {
        let (width, height) = (image.width(), image.height());
        let scale = meters_per_pixel(lat, self.zoom);

        let candidates = self.filter.filter(raw, width, height, scale);
        let zone = self.zones.classify(&candidates, image_center(width, height), scale);
        let quality = self.gate.assess(image);
        let verdict = self.engine.decide(&quality, &candidates, zone);

        debug!(
            raw = raw.len(),
            admissible = candidates.len(),
            scale,
            zone = %zone,
            luminance = quality.mean_luminance,
            rule = ?verdict.rule,
            "Site evaluated"
        );

        SiteEvaluation {
            scale,
            candidates,
            zone,
            quality,
            verdict,
        }
    }

    /// Run the detector, then evaluate
    pub fn run(
        &self,
        sample_id: &str,
        image: &DynamicImage,
        detector: &dyn Detector,
        lat: f64,
    ) -> Result<SiteEvaluation, DetectorError> {
        let raw = detector.infer(DetectorInput { sample_id, image }, self.detect_conf)?;
        Ok(self.evaluate(image, &raw, lat))
    }
}

/// Note recorded when real coordinates replace the fallback location
pub const NOTE_COORDINATES_CORRECTED: &str = "Coordinates corrected from fallback location";

/// Fold an evaluation into a record
///
/// A new record starts from `(sample_id, location)`. An existing one keeps
/// its revision and notes, and its coordinates unless they were only the
/// fallback location; detections, aggregates, zone and verdict are replaced
/// and the new notes appended.
///
/// Callers decide whether the record accepts a machine verdict at all (see
/// [`surya_common::QcStatus::accepts_machine_verdict`]).
pub fn apply_evaluation(
    existing: Option<SiteRecord>,
    sample_id: &str,
    location: &SiteLocation,
    evaluation: &SiteEvaluation,
    extra_notes: &[String],
    image_metadata: Option<ImageMetadata>,
) -> SiteRecord {
    let mut record = match existing {
        Some(mut record) if record.coordinates_fallback => {
            if !location.fallback {
                info!(
                    sample_id = %sample_id,
                    lat = location.lat,
                    lon = location.lon,
                    "Replacing fallback coordinates"
                );
                record.push_note(NOTE_COORDINATES_CORRECTED);
            }
            record.lat = location.lat;
            record.lon = location.lon;
            record.coordinates_fallback = location.fallback;
            record
        }
        Some(record) => {
            if record.lat != location.lat || record.lon != location.lon {
                warn!(
                    sample_id = %sample_id,
                    stored_lat = record.lat,
                    stored_lon = record.lon,
                    lat = location.lat,
                    lon = location.lon,
                    "Coordinates differ from stored record, keeping stored"
                );
            }
            record
        }
        None => {
            let mut record = SiteRecord::new(sample_id, location.lat, location.lon);
            record.coordinates_fallback = location.fallback;
            record
        }
    };

    record.set_detections(
        evaluation
            .candidates
            .iter()
            .map(Candidate::to_detection)
            .collect(),
    );
    record.buffer_zone = evaluation.zone;
    record.qc_status = evaluation.verdict.qc_status;
    record.has_solar = evaluation.verdict.has_solar;
    record.push_note(evaluation.verdict.note.clone());
    for note in extra_notes {
        record.push_note(note.clone());
    }
    if image_metadata.is_some() {
        record.image_metadata = image_metadata;
    }
    record
}

/// Provenance stamp for an image evaluated today
pub fn image_metadata_now(source: &str) -> ImageMetadata {
    ImageMetadata {
        source: source.to_string(),
        capture_date: Utc::now().date_naive(),
    }
}
