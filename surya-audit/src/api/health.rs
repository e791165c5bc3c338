//! Service health endpoint
//!
//! `degraded` means the service is up but a store or integrity failure has
//! been seen since start; the failure text is returned alongside so an
//! operator can tell a tampered record from a full disk.

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Binary that produced the verdicts this instance serves
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub commit: &'static str,
    pub built_at: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            commit: env!("SURYA_COMMIT"),
            built_at: env!("SURYA_BUILT_AT"),
            profile: env!("SURYA_PROFILE"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub build: BuildInfo,
    pub uptime_seconds: u64,
    /// `POST /api/audits` is served
    pub audits_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = Utc::now()
        .signed_duration_since(state.startup_time)
        .num_seconds()
        .max(0) as u64;
    let last_error = state.last_error.read().await.clone();

    Json(HealthResponse {
        status: if last_error.is_some() { "degraded" } else { "ok" },
        service: "surya-audit",
        version: env!("CARGO_PKG_VERSION"),
        build: BuildInfo::current(),
        uptime_seconds,
        audits_enabled: state.auditor.is_some(),
        last_error,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
