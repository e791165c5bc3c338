//! Decision engine
//!
//! Combines the quality gate, admissible candidates and buffer zone into one
//! verdict. Rules are ordered; the first match wins:
//!
//! 1. Image unusable → NOT_VERIFIABLE (quality reason as note)
//! 2. No admissible candidates → VERIFIABLE, no solar ("empty roof")
//! 3. Weak signal (`max_confidence < verify_conf` or `total_area < min_valid_area`)
//!    → VERIFIABLE, no solar ("noise ignored")
//! 4. Strong signal touching a ring → VERIFIABLE, solar, zone recorded
//! 5. Strong signal outside both rings → VERIFIABLE, no solar
//!
//! Absence of evidence yields a confident "empty" verdict; weak or
//! out-of-zone evidence never yields `has_solar = true`.

use surya_common::config::ThresholdConfig;
use surya_common::{BufferZone, QcStatus};

use crate::models::Candidate;
use crate::services::quality_gate::QualityAssessment;

pub const NOTE_EMPTY_ROOF: &str = "Clear View: Empty Roof";
pub const NOTE_WEAK_SIGNAL: &str = "Noise Ignored (Weak Signal)";
pub const NOTE_OUTSIDE_ZONE: &str = "Solar Detected but Outside Compliance Zone";

/// Which rule produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionRule {
    QualityFailure,
    EmptyRoof,
    WeakSignal,
    InZone,
    OutsideZone,
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub qc_status: QcStatus,
    pub has_solar: bool,
    pub rule: DecisionRule,
    pub note: String,
}

/// Two-tier confidence policy
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionEngine {
    verify_conf: f64,
    min_valid_area_sqm: f64,
}

impl DecisionEngine {
    pub fn new(verify_conf: f64, min_valid_area_sqm: f64) -> Self {
        Self {
            verify_conf,
            min_valid_area_sqm,
        }
    }

    pub fn from_thresholds(thresholds: &ThresholdConfig) -> Self {
        Self::new(thresholds.verify_conf, thresholds.min_valid_area_sqm)
    }

    pub fn decide(
        &self,
        quality: &QualityAssessment,
        candidates: &[Candidate],
        zone: BufferZone,
    ) -> Verdict {
        if !quality.usable {
            return Verdict {
                qc_status: QcStatus::NotVerifiable,
                has_solar: false,
                rule: DecisionRule::QualityFailure,
                note: quality.note.clone(),
            };
        }

        if candidates.is_empty() {
            return verifiable(false, DecisionRule::EmptyRoof, NOTE_EMPTY_ROOF.to_string());
        }

        let max_confidence = candidates
            .iter()
            .map(|c| c.confidence)
            .fold(0.0, f64::max);
        let total_area: f64 = candidates.iter().map(|c| c.area_sqm).sum();

        if max_confidence < self.verify_conf || total_area < self.min_valid_area_sqm {
            return verifiable(false, DecisionRule::WeakSignal, NOTE_WEAK_SIGNAL.to_string());
        }

        if zone.is_none() {
            return verifiable(false, DecisionRule::OutsideZone, NOTE_OUTSIDE_ZONE.to_string());
        }

        verifiable(
            true,
            DecisionRule::InZone,
            format!(
                "Solar Confirmed (Zone: {}, {} sq.ft)",
                zone,
                zone.band_sqft()
            ),
        )
    }
}

fn verifiable(has_solar: bool, rule: DecisionRule, note: String) -> Verdict {
    Verdict {
        qc_status: QcStatus::Verifiable,
        has_solar,
        rule,
        note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;

    fn engine() -> DecisionEngine {
        DecisionEngine::from_thresholds(&ThresholdConfig::default())
    }

    fn clear() -> QualityAssessment {
        QualityAssessment {
            usable: true,
            mean_luminance: 140.0,
            note: "Clear".to_string(),
        }
    }

    fn candidate(confidence: f64, area_sqm: f64) -> Candidate {
        Candidate {
            bbox: BoundingBox::new(300.0, 300.0, 340.0, 330.0),
            confidence,
            area_sqm,
        }
    }

    fn triple(v: &Verdict) -> (QcStatus, bool) {
        (v.qc_status, v.has_solar)
    }

    #[test]
    fn test_rule1_quality_failure_wins() {
        let shadow = QualityAssessment {
            usable: false,
            mean_luminance: 21.4,
            note: "Severe Shadow (Level: 21.4)".to_string(),
        };
        let v = engine().decide(&shadow, &[candidate(0.95, 30.0)], BufferZone::ZoneA);
        assert_eq!(triple(&v), (QcStatus::NotVerifiable, false));
        assert_eq!(v.rule, DecisionRule::QualityFailure);
        assert!(v.note.contains("Severe Shadow"));
    }

    #[test]
    fn test_rule2_empty_roof() {
        let v = engine().decide(&clear(), &[], BufferZone::None);
        assert_eq!(triple(&v), (QcStatus::Verifiable, false));
        assert_eq!(v.rule, DecisionRule::EmptyRoof);
        assert!(v.note.to_lowercase().contains("empty roof"));
    }

    #[test]
    fn test_rule3_low_confidence_is_noise() {
        let v = engine().decide(&clear(), &[candidate(0.39, 30.0)], BufferZone::ZoneA);
        assert_eq!(triple(&v), (QcStatus::Verifiable, false));
        assert_eq!(v.rule, DecisionRule::WeakSignal);
        assert!(v.note.to_lowercase().contains("noise ignored"));
    }

    #[test]
    fn test_rule3_small_area_is_noise() {
        let v = engine().decide(
            &clear(),
            &[candidate(0.9, 0.4), candidate(0.2, 0.5)],
            BufferZone::ZoneA,
        );
        assert_eq!(v.rule, DecisionRule::WeakSignal);
        assert!(!v.has_solar);
    }

    #[test]
    fn test_rule3_area_sums_across_candidates() {
        // 0.6 + 0.5 ≥ 1.0 even though neither box alone qualifies
        let v = engine().decide(
            &clear(),
            &[candidate(0.9, 0.6), candidate(0.2, 0.5)],
            BufferZone::ZoneB,
        );
        assert_eq!(v.rule, DecisionRule::InZone);
    }

    #[test]
    fn test_rule4_in_zone_confirms_solar() {
        let v = engine().decide(&clear(), &[candidate(0.6, 5.0)], BufferZone::ZoneA);
        assert_eq!(triple(&v), (QcStatus::Verifiable, true));
        assert_eq!(v.rule, DecisionRule::InZone);
        assert!(v.note.contains("ZONE_A"));
    }

    #[test]
    fn test_rule5_outside_zone_not_certified() {
        let v = engine().decide(&clear(), &[candidate(0.8, 12.0)], BufferZone::None);
        assert_eq!(triple(&v), (QcStatus::Verifiable, false));
        assert_eq!(v.rule, DecisionRule::OutsideZone);
        assert!(v
            .note
            .to_lowercase()
            .contains("detected but outside compliance zone"));
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        // exactly verify_conf and exactly min area count as strong
        let v = engine().decide(&clear(), &[candidate(0.40, 1.0)], BufferZone::ZoneB);
        assert_eq!(v.rule, DecisionRule::InZone);
        assert!(v.note.contains("2400"));
    }
}
