//! HTTP API handlers for surya-audit
//!
//! JSON over HTTP for auditor and citizen actions. The actor is implied by
//! the route: `appeal` is the citizen's, everything else the auditor's.

pub mod audits;
pub mod health;
pub mod lifecycle;
pub mod records;
pub mod summary;

pub use audits::audit_routes;
pub use health::health_routes;
pub use lifecycle::lifecycle_routes;
pub use records::record_routes;
pub use summary::summary_routes;

use crate::{ApiError, ApiResult, AppState};

/// Run blocking store work off the async executor
///
/// 500-class failures are kept as the service's last error for `/health`.
pub(crate) async fn blocking<T, F>(state: &AppState, work: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> surya_common::Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(work)
        .await
        .map_err(ApiError::from)
        .and_then(|r| r.map_err(ApiError::from));

    if let Err(err) = &result {
        if matches!(err, ApiError::Integrity(_) | ApiError::Internal(_)) {
            *state.last_error.write().await = Some(err.to_string());
        }
    }
    result
}
