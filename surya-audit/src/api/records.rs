//! Record read endpoints

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use surya_common::SiteRecord;

use crate::api::blocking;
use crate::{ApiResult, AppState};

/// A record that could not be loaded
#[derive(Debug, Serialize)]
pub struct RecordFailure {
    pub sample_id: String,
    pub error: String,
}

/// GET /api/records response
#[derive(Debug, Serialize)]
pub struct RecordListResponse {
    pub records: Vec<SiteRecord>,
    /// Integrity or parse failures, reported instead of silently dropped
    pub failures: Vec<RecordFailure>,
}

/// GET /api/records
pub async fn list_records(State(state): State<AppState>) -> ApiResult<Json<RecordListResponse>> {
    let store = state.store.clone();
    let (records, failures) = blocking(&state, move || store.list_with_failures()).await?;

    Ok(Json(RecordListResponse {
        records,
        failures: failures
            .into_iter()
            .map(|(sample_id, e)| RecordFailure {
                sample_id,
                error: e.to_string(),
            })
            .collect(),
    }))
}

/// GET /api/records/:id
pub async fn get_record(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
) -> ApiResult<Json<SiteRecord>> {
    let store = state.store.clone();
    let record = blocking(&state, move || store.load(&sample_id)).await?;
    Ok(Json(record))
}

/// GET /api/records/:id/report
///
/// Re-derived from the verified record on every request.
pub async fn get_report(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let store = state.store.clone();
    let sink = state.report_sink.clone();
    let bytes = blocking(&state, move || {
        let record = store.load(&sample_id)?;
        sink.render(&record)
    })
    .await?;

    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], bytes))
}

/// Build record read routes
pub fn record_routes() -> Router<AppState> {
    Router::new()
        .route("/api/records", get(list_records))
        .route("/api/records/:id", get(get_record))
        .route("/api/records/:id/report", get(get_report))
}
