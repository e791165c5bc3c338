//! Image quality gate
//!
//! Measures mean luminance over the central 40% × 40% of the frame
//! (30%–70% on each axis). Heavily shadowed rooftops fall below the
//! threshold and are reported unusable before any detection is trusted.

use image::DynamicImage;
use surya_common::config::ThresholdConfig;

/// Result of the quality check
#[derive(Debug, Clone, PartialEq)]
pub struct QualityAssessment {
    pub usable: bool,
    /// Mean luminance (0-255) of the central region; 0 when the region is empty
    pub mean_luminance: f64,
    /// Human-readable reason
    pub note: String,
}

/// Shadow threshold check
#[derive(Debug, Clone, PartialEq)]
pub struct QualityGate {
    shadow_threshold: f64,
}

impl QualityGate {
    pub fn new(shadow_threshold: f64) -> Self {
        Self { shadow_threshold }
    }

    pub fn from_thresholds(thresholds: &ThresholdConfig) -> Self {
        Self::new(thresholds.shadow_threshold)
    }

    pub fn assess(&self, image: &DynamicImage) -> QualityAssessment {
        let Some(mean) = central_luminance(image) else {
            return QualityAssessment {
                usable: false,
                mean_luminance: 0.0,
                note: format!(
                    "Image Too Small for Quality Check ({}x{})",
                    image.width(),
                    image.height()
                ),
            };
        };

        if mean < self.shadow_threshold {
            QualityAssessment {
                usable: false,
                mean_luminance: mean,
                note: format!("Severe Shadow (Level: {:.1})", mean),
            }
        } else {
            QualityAssessment {
                usable: true,
                mean_luminance: mean,
                note: "Clear".to_string(),
            }
        }
    }
}

/// Mean luma (ITU-R BT.601 weights) of the central region, `None` if it has no pixels
pub fn central_luminance(image: &DynamicImage) -> Option<f64> {
    let rgb = image.to_rgb8();
    let (w, h) = rgb.dimensions();

    let x0 = (f64::from(w) * 0.3) as u32;
    let x1 = (f64::from(w) * 0.7) as u32;
    let y0 = (f64::from(h) * 0.3) as u32;
    let y1 = (f64::from(h) * 0.7) as u32;

    let count = u64::from(x1 - x0) * u64::from(y1 - y0);
    if count == 0 {
        return None;
    }

    let mut sum = 0.0;
    for y in y0..y1 {
        for x in x0..x1 {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            sum += 0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b);
        }
    }
    Some(sum / count as f64)
}
