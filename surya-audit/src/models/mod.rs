//! Data models for surya-audit
//!
//! - Raw and admissible detector boxes
//! - Batch run state tracking
//! - Per-site error reporting

pub mod batch_run;
pub mod detection;
pub mod site_error;

pub use batch_run::{BatchProgress, BatchRun, BatchState};
pub use detection::{BoundingBox, Candidate, RawDetection};
pub use site_error::{ErrorSeverity, SiteError};
