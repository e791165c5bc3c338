//! Buffer zone classification
//!
//! Two concentric rings around the image center. A candidate touches a ring
//! when the nearest point of its box lies within the ring radius (closed
//! interval), so partial overlap counts. The tightest touched ring wins.

use surya_common::config::ThresholdConfig;
use surya_common::BufferZone;

use crate::models::{BoundingBox, Candidate};

/// Ring radii in meters
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneClassifier {
    zone_a_radius_m: f64,
    zone_b_radius_m: f64,
}

impl ZoneClassifier {
    /// `zone_a_radius_m` is the inner (tighter) ring
    pub fn new(zone_a_radius_m: f64, zone_b_radius_m: f64) -> Self {
        Self {
            zone_a_radius_m,
            zone_b_radius_m,
        }
    }

    pub fn from_thresholds(thresholds: &ThresholdConfig) -> Self {
        Self::new(thresholds.zone_a_radius_m, thresholds.zone_b_radius_m)
    }

    /// Ring radii converted to pixels at `scale` meters/pixel
    pub fn radii_px(&self, scale: f64) -> (f64, f64) {
        (self.zone_a_radius_m / scale, self.zone_b_radius_m / scale)
    }

    /// Tightest ring touched by a single box
    pub fn zone_of(&self, bbox: &BoundingBox, center: (f64, f64), scale: f64) -> BufferZone {
        let (r_a, r_b) = self.radii_px(scale);
        let distance = bbox.distance_to(center.0, center.1);

        if within(distance, r_a) {
            BufferZone::ZoneA
        } else if within(distance, r_b) {
            BufferZone::ZoneB
        } else {
            BufferZone::None
        }
    }

    /// Tightest ring touched by any candidate
    pub fn classify(&self, candidates: &[Candidate], center: (f64, f64), scale: f64) -> BufferZone {
        let mut best = BufferZone::None;
        for candidate in candidates {
            match self.zone_of(&candidate.bbox, center, scale) {
                BufferZone::ZoneA => return BufferZone::ZoneA,
                BufferZone::ZoneB => best = BufferZone::ZoneB,
                BufferZone::None => {}
            }
        }
        best
    }
}

/// Image center as used for ring placement (integer halves)
pub fn image_center(width: u32, height: u32) -> (f64, f64) {
    (f64::from(width / 2), f64::from(height / 2))
}

fn within(distance: f64, radius: f64) -> bool {
    radius.is_finite() && distance <= radius
}
