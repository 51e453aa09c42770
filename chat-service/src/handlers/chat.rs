//! Chat endpoints: the streaming turn itself plus credits, transcript
//! retrieval and conversation deletion.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::Stream;
use serde_json::json;
use service_core::error::AppError;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tracing::instrument;
use validator::Validate;

use crate::dtos::{ChatRequest, ConversationResponse, CreditsResponse, MessageResponse};
use crate::middleware::AuthUser;
use crate::services::orchestrator::TurnEvent;
use crate::startup::AppState;

/// POST /ai/chat
///
/// Runs one chat turn and streams the model output back as SSE. Validation
/// and credit failures surface as plain HTTP errors before any event is
/// written; once the stream is open, failures arrive as `error` events.
#[instrument(skip(state, payload), fields(user_id = %user.user_id, model = %payload.model))]
pub async fn stream_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    payload.validate()?;

    let events = state
        .orchestrator
        .start_turn(
            &user.user_id,
            &payload.model,
            payload.conversation_id.as_deref(),
            &payload.message,
        )
        .await?;

    let stream = events.map(|event| {
        let data = match event {
            TurnEvent::Chunk(text) => json!({ "content": text }),
            TurnEvent::Done => json!({ "done": true }),
            TurnEvent::Error(message) => json!({ "error": message }),
        };
        Ok(Event::default().data(data.to_string()))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /ai/credits
#[instrument(skip(state), fields(user_id = %user.user_id))]
pub async fn get_credits(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<CreditsResponse>, AppError> {
    let record = state
        .db
        .find_user(&user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok(Json(CreditsResponse {
        credits: record.credits,
        is_premium: record.is_premium,
    }))
}

/// GET /ai/conversations/:id
#[instrument(skip(state), fields(user_id = %user.user_id, execution_id = %execution_id))]
pub async fn get_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(execution_id): Path<String>,
) -> Result<Json<ConversationResponse>, AppError> {
    let execution = state
        .db
        .get_execution(&execution_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Conversation not found")))?;

    if execution.user_id != user.user_id {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Conversation belongs to another user"
        )));
    }

    let messages = state.db.list_messages(&execution_id).await?;

    Ok(Json(ConversationResponse {
        conversation_id: execution.execution_id,
        title: execution.title,
        messages: messages.into_iter().map(MessageResponse::from).collect(),
    }))
}

/// DELETE /ai/chat/:id
#[instrument(skip(state), fields(user_id = %user.user_id, execution_id = %execution_id))]
pub async fn delete_conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(execution_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let execution = state
        .db
        .get_execution(&execution_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Conversation not found")))?;

    if execution.user_id != user.user_id {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Conversation belongs to another user"
        )));
    }

    state.db.delete_execution(&execution_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
