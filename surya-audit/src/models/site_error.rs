//! Per-site errors reported by a batch run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ErrorSeverity {
    /// Site processed, but something deserves a look (e.g. fallback coordinates)
    Warning,
    /// Site skipped, batch continues
    Skip,
}

/// Per-site error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteError {
    pub sample_id: String,

    /// Error code (e.g., "FETCH_ERROR", "DECODE_ERROR")
    pub error_code: String,

    /// Human-readable error message
    pub error_message: String,

    pub severity: ErrorSeverity,

    pub occurred_at: DateTime<Utc>,
}

impl SiteError {
    /// Create new warning
    pub fn warning(
        sample_id: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self::with_severity(sample_id, error_code, error_message, ErrorSeverity::Warning)
    }

    /// Create new skip error
    pub fn skip(
        sample_id: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self::with_severity(sample_id, error_code, error_message, ErrorSeverity::Skip)
    }

    fn with_severity(
        sample_id: impl Into<String>,
        error_code: impl Into<String>,
        error_message: impl Into<String>,
        severity: ErrorSeverity,
    ) -> Self {
        Self {
            sample_id: sample_id.into(),
            error_code: error_code.into(),
            error_message: error_message.into(),
            severity,
            occurred_at: Utc::now(),
        }
    }
}
