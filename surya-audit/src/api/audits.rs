//! Single-site audit endpoint
//!
//! Runs one site through the same path as a batch run, so a record under
//! human review is left untouched here as well.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use surya_common::SiteRecord;
use tracing::info;

use crate::models::SiteError;
use crate::services::record_store::validate_sample_id;
use crate::workflow::{SiteJob, SiteOutcome};
use crate::{ApiError, ApiResult, AppState};

/// POST /api/audits request
#[derive(Debug, Deserialize)]
pub struct AuditRequest {
    pub sample_id: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// POST /api/audits response
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub record: SiteRecord,
    /// Non-fatal findings, e.g. a failed report write
    pub warnings: Vec<SiteError>,
}

/// POST /api/audits
pub async fn create_audit(
    State(state): State<AppState>,
    Json(req): Json<AuditRequest>,
) -> ApiResult<Json<AuditResponse>> {
    let auditor = state
        .auditor
        .clone()
        .ok_or_else(|| ApiError::Unavailable("site audits are not enabled".to_string()))?;

    validate_sample_id(&req.sample_id)?;
    if !req.latitude.is_finite() || !req.longitude.is_finite() {
        return Err(ApiError::BadRequest(format!(
            "{}: coordinates must be finite",
            req.sample_id
        )));
    }

    let job = SiteJob {
        sample_id: req.sample_id,
        lat: req.latitude,
        lon: req.longitude,
        fallback: false,
    };
    info!(sample_id = %job.sample_id, "Single-site audit requested");

    match auditor.audit_site(job).await? {
        SiteOutcome::Written { record, warnings } => Ok(Json(AuditResponse { record, warnings })),
        SiteOutcome::Held { record, .. } => Err(ApiError::Conflict(format!(
            "{} is {} and awaits a human decision",
            record.sample_id, record.qc_status
        ))),
    }
}

pub fn audit_routes() -> Router<AppState> {
    Router::new().route("/api/audits", post(create_audit))
}
