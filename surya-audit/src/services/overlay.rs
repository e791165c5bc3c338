//! Audit overlay artifact
//!
//! The evaluated image annotated for the auditor, written as
//! `<dir>/<sample_id>_audit.jpg`: both compliance rings around the image
//! center, every admissible box colored by how it counted, and a status bar
//! across the top.
//!
//! | Box color | Meaning                                              |
//! |-----------|------------------------------------------------------|
//! | red       | below the verify confidence, or outside both rings   |
//! | green     | counts and touches the inner ring                    |
//! | orange    | counts and touches only the outer ring               |

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage};
use surya_common::config::ThresholdConfig;
use surya_common::{BufferZone, Error, QcStatus, Result};
use tracing::info;

use crate::models::{BoundingBox, Candidate};
use crate::services::decision_engine::Verdict;
use crate::services::zone_classifier::{image_center, ZoneClassifier};

pub const RING_A_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const RING_B_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
pub const UNCOUNTED_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const ZONE_A_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const ZONE_B_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
pub const NOT_VERIFIABLE_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

/// Height of the status bar
const STATUS_BAR_PX: u32 = 8;
const BOX_THICKNESS_PX: i64 = 2;

/// Draws overlays with the same rings and confidence tier as the decision
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    verify_conf: f64,
    zones: ZoneClassifier,
}

impl OverlayRenderer {
    pub fn new(verify_conf: f64, zones: ZoneClassifier) -> Self {
        Self { verify_conf, zones }
    }

    pub fn from_thresholds(thresholds: &ThresholdConfig) -> Self {
        Self::new(thresholds.verify_conf, ZoneClassifier::from_thresholds(thresholds))
    }

    /// Color a candidate is outlined in
    pub fn box_color(&self, candidate: &Candidate, center: (f64, f64), scale: f64) -> Rgb<u8> {
        if candidate.confidence < self.verify_conf {
            return UNCOUNTED_COLOR;
        }
        match self.zones.zone_of(&candidate.bbox, center, scale) {
            BufferZone::ZoneA => ZONE_A_COLOR,
            BufferZone::ZoneB => ZONE_B_COLOR,
            BufferZone::None => UNCOUNTED_COLOR,
        }
    }

    pub fn render(
        &self,
        image: &DynamicImage,
        candidates: &[Candidate],
        scale: f64,
        verdict: &Verdict,
    ) -> RgbImage {
        let mut canvas = image.to_rgb8();
        let (width, height) = canvas.dimensions();
        let center = image_center(width, height);

        let (r_a, r_b) = self.zones.radii_px(scale);
        draw_circle(&mut canvas, center, r_a.floor(), RING_A_COLOR);
        draw_circle(&mut canvas, center, r_b.floor(), RING_B_COLOR);

        for candidate in candidates {
            let color = self.box_color(candidate, center, scale);
            draw_box(&mut canvas, &candidate.bbox, color);
        }

        let bar = status_color(verdict);
        for y in 0..STATUS_BAR_PX.min(height) {
            for x in 0..width {
                canvas.put_pixel(x, y, bar);
            }
        }
        canvas
    }

    /// Render and write `<dir>/<sample_id>_audit.jpg`
    pub fn write(
        &self,
        sample_id: &str,
        image: &DynamicImage,
        candidates: &[Candidate],
        scale: f64,
        verdict: &Verdict,
        dir: &Path,
    ) -> Result<PathBuf> {
        let canvas = self.render(image, candidates, scale, verdict);
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}_audit.jpg", sample_id));
        canvas
            .save(&path)
            .map_err(|e| Error::Image(format!("{}: {}", path.display(), e)))?;
        info!(sample_id = %sample_id, path = %path.display(), "Overlay written");
        Ok(path)
    }
}

fn status_color(verdict: &Verdict) -> Rgb<u8> {
    match verdict.qc_status {
        QcStatus::NotVerifiable => NOT_VERIFIABLE_COLOR,
        _ if verdict.has_solar => ZONE_A_COLOR,
        _ => UNCOUNTED_COLOR,
    }
}

fn plot(canvas: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    if x >= 0 && y >= 0 && x < i64::from(width) && y < i64::from(height) {
        canvas.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_circle(canvas: &mut RgbImage, center: (f64, f64), radius: f64, color: Rgb<u8>) {
    if !radius.is_finite() || radius <= 0.0 {
        return;
    }
    let steps = (std::f64::consts::TAU * radius * 2.0).ceil().clamp(64.0, 100_000.0) as usize;
    for i in 0..steps {
        let theta = std::f64::consts::TAU * i as f64 / steps as f64;
        let x = (center.0 + radius * theta.cos()).round() as i64;
        let y = (center.1 + radius * theta.sin()).round() as i64;
        plot(canvas, x, y, color);
    }
}

fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    if !bbox.is_finite() {
        return;
    }
    let (x1, y1, x2, y2) = (bbox.x1 as i64, bbox.y1 as i64, bbox.x2 as i64, bbox.y2 as i64);
    for k in 0..BOX_THICKNESS_PX {
        for x in x1..=x2 {
            plot(canvas, x, y1 + k, color);
            plot(canvas, x, y2 - k, color);
        }
        for y in y1..=y2 {
            plot(canvas, x1 + k, y, color);
            plot(canvas, x2 - k, y, color);
        }
    }
}
