use axum::http::StatusCode;

use crate::services::metrics::get_metrics;

/// GET /metrics - Prometheus exposition.
pub async fn metrics_handler() -> (StatusCode, String) {
    (StatusCode::OK, get_metrics())
}
