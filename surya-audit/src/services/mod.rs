//! Services for surya-audit
//!
//! Pure evaluation stages (filter, zones, quality, decision), the record store
//! and lifecycle, and the seams to external collaborators.

pub mod audit_lifecycle;
pub mod candidate_filter;
pub mod coordinate_intake;
pub mod decision_engine;
pub mod detector;
pub mod image_source;
pub mod overlay;
pub mod quality_gate;
pub mod record_store;
pub mod report;
pub mod summary;
pub mod zone_classifier;

pub use audit_lifecycle::{
    apply_action, apply_override, next_state, Actor, AuditAction, AuditLifecycle, CitizenNotifier,
    ManualOverride, OverrideVerdict, TracingNotifier,
};
pub use candidate_filter::{CandidateFilter, Rejection};
pub use coordinate_intake::{CoordinateTable, IntakeError, SiteLocation};
pub use decision_engine::{DecisionEngine, DecisionRule, Verdict};
pub use detector::{Detector, DetectorError, DetectorInput, SidecarDetector, StaticDetector};
pub use image_source::{FetchError, ImageSource, LocalImageSource, SiteRequest, StaticMapsSource};
pub use overlay::OverlayRenderer;
pub use quality_gate::{QualityAssessment, QualityGate};
pub use record_store::RecordStore;
pub use report::{write_report, ReportSink, TextReport};
pub use summary::AuditSummary;
pub use zone_classifier::{image_center, ZoneClassifier};
