//! Candidate filter
//!
//! Rejects detector boxes that are frame artifacts or implausible shapes and
//! attaches a ground area to the survivors.
//!
//! **Rejection rules** (a box is dropped if ANY matches):
//! - bottom edge inside the footer band (watermark/attribution overlay)
//! - left, top or right edge within `edge_margin_px` of the frame (truncated object)
//! - zero (or negative) width or height, or non-finite corners
//! - longer/shorter side ratio above `max_aspect_ratio`

use surya_common::config::ThresholdConfig;
use surya_common::record::round2;
use tracing::debug;

use crate::models::{BoundingBox, Candidate, RawDetection};

/// Why a box was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Footer,
    FrameEdge,
    Degenerate,
    AspectRatio,
}

/// Admissibility filter
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFilter {
    footer_height_px: f64,
    edge_margin_px: f64,
    max_aspect_ratio: f64,
}

impl CandidateFilter {
    pub fn new(footer_height_px: f64, edge_margin_px: f64, max_aspect_ratio: f64) -> Self {
        Self {
            footer_height_px,
            edge_margin_px,
            max_aspect_ratio,
        }
    }

    pub fn from_thresholds(thresholds: &ThresholdConfig) -> Self {
        Self::new(
            thresholds.footer_height_px,
            thresholds.edge_margin_px,
            thresholds.max_aspect_ratio,
        )
    }

    /// First matching rejection rule, or `None` if the box is admissible
    pub fn rejection(&self, bbox: &BoundingBox, width: u32, height: u32) -> Option<Rejection> {
        let (w, h) = (f64::from(width), f64::from(height));

        if !bbox.is_finite() {
            return Some(Rejection::Degenerate);
        }

        if bbox.y2 > h - self.footer_height_px {
            return Some(Rejection::Footer);
        }
        if bbox.x1 < self.edge_margin_px
            || bbox.y1 < self.edge_margin_px
            || bbox.x2 > w - self.edge_margin_px
        {
            return Some(Rejection::FrameEdge);
        }
        if bbox.width().min(bbox.height()) <= 0.0 {
            return Some(Rejection::Degenerate);
        }
        if bbox.aspect_ratio() > self.max_aspect_ratio {
            return Some(Rejection::AspectRatio);
        }
        None
    }

    /// Keep admissible boxes (input order preserved) with area `pixel_area * scale²`
    ///
    /// Pure: no state, and filtering the output again yields the same set.
    pub fn filter(
        &self,
        raw: &[RawDetection],
        width: u32,
        height: u32,
        scale: f64,
    ) -> Vec<Candidate> {
        raw.iter()
            .filter_map(|det| match self.rejection(&det.bbox, width, height) {
                Some(reason) => {
                    debug!(?reason, bbox = ?det.bbox, confidence = det.confidence, "Box rejected");
                    None
                }
                None => Some(Candidate {
                    bbox: det.bbox,
                    confidence: det.confidence,
                    area_sqm: round2(det.bbox.pixel_area() * scale * scale),
                }),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 640;
    const H: u32 = 640;

    fn filter() -> CandidateFilter {
        CandidateFilter::from_thresholds(&ThresholdConfig::default())
    }

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, conf: f64) -> RawDetection {
        RawDetection::new(BoundingBox::new(x1, y1, x2, y2), conf)
    }

    #[test]
    fn test_footer_band_rejected() {
        // footer band starts at y = 590
        let f = filter();
        assert_eq!(
            f.rejection(&BoundingBox::new(300.0, 560.0, 340.0, 591.0), W, H),
            Some(Rejection::Footer)
        );
        assert_eq!(
            f.rejection(&BoundingBox::new(300.0, 560.0, 340.0, 590.0), W, H),
            None
        );
    }

    #[test]
    fn test_frame_edges_rejected() {
        let f = filter();
        assert_eq!(
            f.rejection(&BoundingBox::new(4.0, 100.0, 40.0, 140.0), W, H),
            Some(Rejection::FrameEdge)
        );
        assert_eq!(
            f.rejection(&BoundingBox::new(100.0, 4.9, 140.0, 140.0), W, H),
            Some(Rejection::FrameEdge)
        );
        assert_eq!(
            f.rejection(&BoundingBox::new(600.0, 100.0, 636.0, 140.0), W, H),
            Some(Rejection::FrameEdge)
        );
        // exactly on the margin is allowed
        assert_eq!(
            f.rejection(&BoundingBox::new(5.0, 5.0, 100.0, 100.0), W, H),
            None
        );
        assert_eq!(
            f.rejection(&BoundingBox::new(540.0, 5.0, 635.0, 100.0), W, H),
            None
        );
    }

    #[test]
    fn test_degenerate_rejected() {
        let f = filter();
        assert_eq!(
            f.rejection(&BoundingBox::new(100.0, 100.0, 100.0, 140.0), W, H),
            Some(Rejection::Degenerate)
        );
        assert_eq!(
            f.rejection(&BoundingBox::new(140.0, 100.0, 100.0, 140.0), W, H),
            Some(Rejection::Degenerate)
        );
        assert_eq!(
            f.rejection(&BoundingBox::new(100.0, f64::NAN, 140.0, 140.0), W, H),
            Some(Rejection::Degenerate)
        );
    }

    #[test]
    fn test_elongated_rejected() {
        let f = filter();
        // 46 x 10 → 4.6
        assert_eq!(
            f.rejection(&BoundingBox::new(100.0, 100.0, 146.0, 110.0), W, H),
            Some(Rejection::AspectRatio)
        );
        // 45 x 10 → 4.5 exactly, still admissible
        assert_eq!(
            f.rejection(&BoundingBox::new(100.0, 100.0, 145.0, 110.0), W, H),
            None
        );
    }

    #[test]
    fn test_area_uses_scale_squared() {
        let f = filter();
        let out = f.filter(&[det(300.0, 300.0, 340.0, 330.0, 0.8)], W, H, 0.1492);
        assert_eq!(out.len(), 1);
        // 1200 px² * 0.1492² = 26.713...
        assert_eq!(out[0].area_sqm, 26.71);
        assert_eq!(out[0].confidence, 0.8);
    }

    #[test]
    fn test_keeps_order_and_drops_rejects() {
        let f = filter();
        let raw = vec![
            det(300.0, 300.0, 340.0, 330.0, 0.9),
            det(0.0, 300.0, 40.0, 330.0, 0.9),
            det(200.0, 200.0, 230.0, 220.0, 0.2),
        ];
        let out = f.filter(&raw, W, H, 0.15);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].bbox, raw[0].bbox);
        assert_eq!(out[1].bbox, raw[2].bbox);
    }

    #[test]
    fn test_filter_is_idempotent() {
        let f = filter();
        let raw = vec![
            det(300.0, 300.0, 340.0, 330.0, 0.9),
            det(2.0, 300.0, 40.0, 330.0, 0.7),
            det(100.0, 580.0, 140.0, 620.0, 0.6),
            det(100.0, 100.0, 200.0, 110.0, 0.6),
            det(250.0, 260.0, 270.0, 300.0, 0.3),
        ];
        let once = f.filter(&raw, W, H, 0.1492);
        let again_input: Vec<RawDetection> = once.iter().map(Candidate::to_raw).collect();
        let twice = f.filter(&again_input, W, H, 0.1492);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        assert!(filter().filter(&[], W, H, 0.15).is_empty());
    }
}
