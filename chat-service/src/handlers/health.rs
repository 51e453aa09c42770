use axum::{extract::State, Json};
use serde_json::{json, Value};
use service_core::error::AppError;

use crate::startup::AppState;

/// GET /health - liveness probe.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "chat-service"
    }))
}

/// GET /ready - readiness probe: database and provider must both answer.
pub async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.db.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Readiness check failed: database");
        AppError::ServiceUnavailable
    })?;

    state.provider.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Readiness check failed: provider");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(json!({
        "status": "ready",
        "service": "chat-service"
    })))
}
