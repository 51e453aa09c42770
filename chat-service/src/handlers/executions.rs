use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;
use tracing::instrument;

use crate::dtos::{ExecutionListQuery, ExecutionListResponse, ExecutionResponse};
use crate::middleware::AuthUser;
use crate::models::ExecutionType;
use crate::startup::AppState;

/// GET /execution
///
/// Lists the caller's executions, most recently updated first. `?type=`
/// filters by execution kind.
#[instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn list_executions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ExecutionListQuery>,
) -> Result<Json<ExecutionListResponse>, AppError> {
    let execution_type = match query.execution_type.as_deref() {
        Some(value) => Some(ExecutionType::parse(value).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Unknown execution type: {}", value))
        })?),
        None => None,
    };

    let executions = state
        .db
        .list_executions(&user.user_id, execution_type)
        .await?;

    Ok(Json(ExecutionListResponse {
        executions: executions.into_iter().map(ExecutionResponse::from).collect(),
    }))
}
