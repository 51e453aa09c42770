//! Billing webhook.
//!
//! The only code path that flips a user's premium flag. The payment
//! provider signs the raw body; anything that fails verification is
//! rejected before the payload is even parsed.

use axum::{extract::State, http::HeaderMap, http::StatusCode};
use service_core::error::AppError;
use service_core::utils::signature::verify_signature;
use tracing::instrument;

use crate::dtos::BillingWebhookEvent;
use crate::startup::AppState;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// POST /billing/webhook
#[instrument(skip(state, headers, body))]
pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature")))?;

    let valid = verify_signature(&state.config.billing.webhook_secret, &body, signature)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Signature check failed: {}", e)))?;

    if !valid {
        tracing::warn!("Rejected webhook with invalid signature");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Invalid webhook signature"
        )));
    }

    let event: BillingWebhookEvent = serde_json::from_str(&body)
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Malformed webhook payload: {}", e)))?;

    match event.event.as_str() {
        "payment.captured" => {
            state
                .db
                .grant_premium(&event.payload.user_id, event.payload.credits)
                .await?;
            tracing::info!(
                user_id = %event.payload.user_id,
                credits = event.payload.credits,
                "Processed payment.captured webhook"
            );
        }
        other => {
            // Unhandled event types are acknowledged so the provider does
            // not retry them.
            tracing::info!(event = %other, "Ignoring unhandled webhook event");
        }
    }

    Ok(StatusCode::OK)
}
