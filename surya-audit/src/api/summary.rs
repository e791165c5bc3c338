//! Dashboard summary endpoint

use axum::{extract::State, routing::get, Json, Router};

use crate::api::blocking;
use crate::services::AuditSummary;
use crate::{ApiResult, AppState};

/// GET /api/summary
///
/// Unreadable records are counted, not folded into the totals.
pub async fn get_summary(State(state): State<AppState>) -> ApiResult<Json<AuditSummary>> {
    let store = state.store.clone();
    let summary = blocking(&state, move || {
        let (records, failures) = store.list_with_failures()?;
        Ok(AuditSummary::from_records(&records, failures.len()))
    })
    .await?;
    Ok(Json(summary))
}

pub fn summary_routes() -> Router<AppState> {
    Router::new().route("/api/summary", get(get_summary))
}
