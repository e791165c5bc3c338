//! surya-audit library interface
//!
//! Detection-to-decision pipeline, record store, audit lifecycle and the
//! HTTP API, exposed for the binary and for integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::{AuditLifecycle, RecordStore, ReportSink, TextReport};
use crate::workflow::BatchRunner;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RecordStore>,
    pub lifecycle: AuditLifecycle,
    pub report_sink: Arc<dyn ReportSink>,
    /// Runs single-site audits; `None` disables `POST /api/audits`
    pub auditor: Option<Arc<BatchRunner>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last 500-class error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(store: Arc<RecordStore>, lifecycle: AuditLifecycle) -> Self {
        Self {
            store,
            lifecycle,
            report_sink: Arc::new(TextReport),
            auditor: None,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_auditor(mut self, auditor: Arc<BatchRunner>) -> Self {
        self.auditor = Some(auditor);
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::record_routes())
        .merge(api::lifecycle_routes())
        .merge(api::summary_routes())
        .merge(api::audit_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
