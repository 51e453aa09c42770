use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::services::jwt::AccessTokenClaims;
use crate::startup::AppState;

/// Bearer-token authentication middleware.
///
/// Validates the access token and stashes the claims in request extensions
/// for the [`AuthUser`] extractor.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing authorization header")))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Invalid authorization header")))?;

    let claims = state
        .jwt_service
        .validate_access_token(token)
        .map_err(|e| AppError::Unauthorized(anyhow::anyhow!("Invalid access token: {}", e)))?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor for the authenticated user, populated by [`auth_middleware`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub email: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<AccessTokenClaims>()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))?;

        Ok(AuthUser {
            user_id: claims.sub.clone(),
            email: claims.email.clone(),
        })
    }
}
