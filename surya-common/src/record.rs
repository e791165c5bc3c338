//! Persisted site record
//!
//! One record per `sample_id`. The record carries its own SHA-256 integrity
//! hash over a canonical (sorted-key, compact) JSON rendering of every other
//! field, so any document can be re-verified from its bytes alone.
//!
//! **Invariants** (checked by [`SiteRecord::validate`] before every save):
//! - `sample_id` is non-empty
//! - `has_solar = true` requires `qc_status = VERIFIABLE` and `buffer_zone != NONE`
//! - confidences lie in [0, 1]; areas and coordinates are finite
//!
//! Optional fields are omitted from the document while unset, so they only
//! enter the hash once they carry information.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Regulatory buffer ring around the image center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BufferZone {
    /// No admissible detection touches either ring
    #[default]
    None,
    /// Inner ring (1200 sq.ft band)
    ZoneA,
    /// Outer ring (2400 sq.ft band)
    ZoneB,
}

impl BufferZone {
    /// Wire name (`NONE`, `ZONE_A`, `ZONE_B`)
    pub fn as_str(&self) -> &'static str {
        match self {
            BufferZone::None => "NONE",
            BufferZone::ZoneA => "ZONE_A",
            BufferZone::ZoneB => "ZONE_B",
        }
    }

    /// Regulatory band in square feet (0 when no ring applies)
    pub fn band_sqft(&self) -> u32 {
        match self {
            BufferZone::None => 0,
            BufferZone::ZoneA => 1200,
            BufferZone::ZoneB => 2400,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, BufferZone::None)
    }
}

impl std::fmt::Display for BufferZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verification status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QcStatus {
    /// Verdict trusted; `has_solar` is meaningful
    Verifiable,
    /// Image or evidence insufficient for a verdict
    NotVerifiable,
    /// Auditor asked the citizen for proof
    PendingAuditorFlag,
    /// Citizen proof awaiting auditor review
    PendingCitizenAppeal,
}

impl QcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QcStatus::Verifiable => "VERIFIABLE",
            QcStatus::NotVerifiable => "NOT_VERIFIABLE",
            QcStatus::PendingAuditorFlag => "PENDING_AUDITOR_FLAG",
            QcStatus::PendingCitizenAppeal => "PENDING_CITIZEN_APPEAL",
        }
    }

    /// Awaiting a human action
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            QcStatus::PendingAuditorFlag | QcStatus::PendingCitizenAppeal
        )
    }

    /// A machine verdict may replace the current one
    ///
    /// Only NOT_VERIFIABLE (never decided, or re-opened by an auditor) is
    /// open; pending and verified records belong to the human reviewers.
    pub fn accepts_machine_verdict(&self) -> bool {
        matches!(self, QcStatus::NotVerifiable)
    }
}

impl std::fmt::Display for QcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admissible detection as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Pixel box `[x1, y1, x2, y2]`
    pub bbox: [f64; 4],
    /// Detector confidence (0.0-1.0)
    pub confidence: f64,
    /// Ground area in square meters, rounded to 2 decimals
    pub area_sqm: f64,
}

/// Provenance of the evaluated image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMetadata {
    /// Image provider (e.g. "Google Static Maps", "local")
    pub source: String,
    /// Day the image was evaluated
    pub capture_date: NaiveDate,
}

/// Canonical record for one site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub sample_id: String,
    pub lat: f64,
    pub lon: f64,
    /// `lat`/`lon` are the configured fallback, not the site's own coordinates
    #[serde(default, skip_serializing_if = "is_false")]
    pub coordinates_fallback: bool,
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default)]
    pub max_confidence: f64,
    #[serde(default)]
    pub total_area_sqm: f64,
    #[serde(default)]
    pub buffer_zone: BufferZone,
    pub qc_status: QcStatus,
    #[serde(default)]
    pub has_solar: bool,
    /// Rationale trail; appended by every verdict and transition
    #[serde(default)]
    pub qc_notes: Vec<String>,
    /// Optimistic-concurrency revision, 0 until first save
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub image_metadata: Option<ImageMetadata>,
    /// File name of the latest citizen proof upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appeal_proof: Option<String>,
    /// SHA-256 over every other field, recomputed on each save
    #[serde(default)]
    pub integrity_hash: String,
}

impl SiteRecord {
    /// Create an unsaved record with no verdict applied yet
    pub fn new(sample_id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            sample_id: sample_id.into(),
            lat,
            lon,
            coordinates_fallback: false,
            detections: Vec::new(),
            max_confidence: 0.0,
            total_area_sqm: 0.0,
            buffer_zone: BufferZone::None,
            qc_status: QcStatus::NotVerifiable,
            has_solar: false,
            qc_notes: Vec::new(),
            revision: 0,
            image_metadata: None,
            appeal_proof: None,
            integrity_hash: String::new(),
        }
    }

    /// Replace detections and recompute the derived aggregates
    pub fn set_detections(&mut self, detections: Vec<Detection>) {
        self.max_confidence = round2(
            detections
                .iter()
                .map(|d| d.confidence)
                .fold(0.0, f64::max),
        );
        self.total_area_sqm = round2(detections.iter().map(|d| d.area_sqm).sum());
        self.detections = detections;
    }

    pub fn push_note(&mut self, note: impl Into<String>) {
        self.qc_notes.push(note.into());
    }

    /// Verified solar installation inside a compliance ring
    pub fn is_certified(&self) -> bool {
        self.qc_status == QcStatus::Verifiable && self.has_solar
    }

    /// Hex SHA-256 of the canonical serialization, `integrity_hash` excluded
    pub fn compute_hash(&self) -> Result<String> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("integrity_hash");
        }

        let mut canonical = String::new();
        write_canonical(&value, &mut canonical)?;

        let digest = Sha256::digest(canonical.as_bytes());
        Ok(format!("{:x}", digest))
    }

    /// Recompute and store the integrity hash
    pub fn seal(&mut self) -> Result<()> {
        self.integrity_hash = self.compute_hash()?;
        Ok(())
    }

    /// Fail with [`Error::Integrity`] if the stored hash is stale
    pub fn verify_integrity(&self) -> Result<()> {
        let actual = self.compute_hash()?;
        if actual != self.integrity_hash {
            return Err(Error::Integrity {
                sample_id: self.sample_id.clone(),
                expected: self.integrity_hash.clone(),
                actual,
            });
        }
        Ok(())
    }

    /// Check model invariants
    pub fn validate(&self) -> Result<()> {
        if self.sample_id.trim().is_empty() {
            return Err(Error::Invariant("sample_id must not be empty".to_string()));
        }
        if !self.lat.is_finite() || !self.lon.is_finite() {
            return Err(Error::Invariant(format!(
                "{}: coordinates must be finite",
                self.sample_id
            )));
        }
        if self.has_solar && self.qc_status != QcStatus::Verifiable {
            return Err(Error::Invariant(format!(
                "{}: has_solar requires VERIFIABLE, status is {}",
                self.sample_id, self.qc_status
            )));
        }
        if self.has_solar && self.buffer_zone.is_none() {
            return Err(Error::Invariant(format!(
                "{}: has_solar requires a buffer zone",
                self.sample_id
            )));
        }
        if !(0.0..=1.0).contains(&self.max_confidence) {
            return Err(Error::Invariant(format!(
                "{}: max_confidence {} outside [0, 1]",
                self.sample_id, self.max_confidence
            )));
        }
        if !self.total_area_sqm.is_finite() || self.total_area_sqm < 0.0 {
            return Err(Error::Invariant(format!(
                "{}: total_area_sqm must be a non-negative number",
                self.sample_id
            )));
        }
        for d in &self.detections {
            if !(0.0..=1.0).contains(&d.confidence) {
                return Err(Error::Invariant(format!(
                    "{}: detection confidence {} outside [0, 1]",
                    self.sample_id, d.confidence
                )));
            }
        }
        Ok(())
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compact JSON with object keys sorted at every level.
///
/// Sorting is done here rather than relying on the map type, so the digest
/// does not depend on serde_json feature flags.
fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(&map[key.as_str()], out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}
