//! Lifecycle action endpoints
//!
//! Each POST performs one transition and returns the updated record.
//! Refused transitions come back as 400, lost races as 409.

use axum::{
    body::Bytes,
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use surya_common::{BufferZone, SiteRecord};

use crate::api::blocking;
use crate::services::ManualOverride;
use crate::{ApiError, ApiResult, AppState};

/// Optional body of POST /api/records/:id/accept-solar
#[derive(Debug, Default, Deserialize)]
pub struct AcceptSolarRequest {
    #[serde(default)]
    pub zone: Option<BufferZone>,
}

/// POST /api/records/:id/flag
pub async fn flag(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
) -> ApiResult<Json<SiteRecord>> {
    let lifecycle = state.lifecycle.clone();
    let record = blocking(&state, move || lifecycle.flag_for_review(&sample_id)).await?;
    Ok(Json(record))
}

/// POST /api/records/:id/appeal
///
/// **Request:** raw proof image bytes
pub async fn appeal(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
    proof: Bytes,
) -> ApiResult<Json<SiteRecord>> {
    let lifecycle = state.lifecycle.clone();
    let record = blocking(&state, move || lifecycle.submit_appeal(&sample_id, &proof)).await?;
    Ok(Json(record))
}

/// POST /api/records/:id/accept-solar
///
/// **Request:** empty, or `{"zone": "ZONE_A"}`
pub async fn accept_solar(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<SiteRecord>> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        AcceptSolarRequest::default()
    } else {
        serde_json::from_slice::<AcceptSolarRequest>(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid accept-solar body: {}", e)))?
    };

    let lifecycle = state.lifecycle.clone();
    let record = blocking(&state, move || lifecycle.accept_solar(&sample_id, request.zone)).await?;
    Ok(Json(record))
}

/// POST /api/records/:id/verify-empty
pub async fn verify_empty(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
) -> ApiResult<Json<SiteRecord>> {
    let lifecycle = state.lifecycle.clone();
    let record = blocking(&state, move || lifecycle.verify_empty(&sample_id)).await?;
    Ok(Json(record))
}

/// POST /api/records/:id/reject-evidence
pub async fn reject_evidence(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
) -> ApiResult<Json<SiteRecord>> {
    let lifecycle = state.lifecycle.clone();
    let record = blocking(&state, move || lifecycle.reject_evidence(&sample_id)).await?;
    Ok(Json(record))
}

/// POST /api/records/:id/unlock
pub async fn unlock(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
) -> ApiResult<Json<SiteRecord>> {
    let lifecycle = state.lifecycle.clone();
    let record = blocking(&state, move || lifecycle.unlock(&sample_id)).await?;
    Ok(Json(record))
}

/// POST /api/records/:id/override
///
/// **Request:** `{"verdict": "SOLAR", "zone": "ZONE_B", "total_area_sqm": 14.2, "notes": [..]}`
pub async fn manual_override(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
    Json(edit): Json<ManualOverride>,
) -> ApiResult<Json<SiteRecord>> {
    let lifecycle = state.lifecycle.clone();
    let record = blocking(&state, move || lifecycle.manual_override(&sample_id, &edit)).await?;
    Ok(Json(record))
}

/// Build lifecycle routes
pub fn lifecycle_routes() -> Router<AppState> {
    Router::new()
        .route("/api/records/:id/flag", post(flag))
        .route("/api/records/:id/appeal", post(appeal))
        .route("/api/records/:id/accept-solar", post(accept_solar))
        .route("/api/records/:id/verify-empty", post(verify_empty))
        .route("/api/records/:id/reject-evidence", post(reject_evidence))
        .route("/api/records/:id/unlock", post(unlock))
        .route("/api/records/:id/override", post(manual_override))
}
