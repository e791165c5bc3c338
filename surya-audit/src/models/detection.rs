//! Detector boxes
//!
//! A [`RawDetection`] is whatever the detector produced. A [`Candidate`] is a
//! box that survived admissibility filtering and carries its ground area.

use serde::{Deserialize, Serialize};
use surya_common::Detection;

/// Axis-aligned pixel box, serialized as `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn is_finite(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2].iter().all(|v| v.is_finite())
    }

    /// Area in square pixels
    pub fn pixel_area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Longer side over shorter side (infinite for degenerate boxes)
    pub fn aspect_ratio(&self) -> f64 {
        let (w, h) = (self.width(), self.height());
        let shorter = w.min(h);
        if shorter <= 0.0 {
            return f64::INFINITY;
        }
        w.max(h) / shorter
    }

    /// Euclidean distance from `(cx, cy)` to the nearest point of the box.
    ///
    /// Zero when the point lies inside the box.
    pub fn distance_to(&self, cx: f64, cy: f64) -> f64 {
        let closest_x = cx.max(self.x1).min(self.x2);
        let closest_y = cy.max(self.y1).min(self.y2);
        let dx = cx - closest_x;
        let dy = cy - closest_y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<[f64; 4]> for BoundingBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f64; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Box and confidence as reported by the detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub confidence: f64,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self { bbox, confidence }
    }
}

/// Admissible detection with ground area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub confidence: f64,
    /// Square meters, rounded to 2 decimals
    pub area_sqm: f64,
}

impl Candidate {
    /// Back to the detector form (for re-filtering)
    pub fn to_raw(&self) -> RawDetection {
        RawDetection::new(self.bbox, self.confidence)
    }

    /// Persisted form
    pub fn to_detection(&self) -> Detection {
        Detection {
            bbox: self.bbox.into(),
            confidence: self.confidence,
            area_sqm: self.area_sqm,
        }
    }
}
