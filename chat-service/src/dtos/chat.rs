use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Execution, Message};

/// Request body for a chat turn.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[validate(length(min = 1, message = "Message must not be empty"))]
    pub message: String,

    #[validate(length(min = 1, message = "Model must not be empty"))]
    pub model: String,

    /// Omitted or empty starts a new conversation.
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Response for the credits endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    pub credits: i64,
    pub is_premium: bool,
}

/// One transcript message on the wire.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: String,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(m: Message) -> Self {
        Self {
            id: m.message_id,
            role: m.role.to_string(),
            content: m.content,
            created_at: m.created_at,
        }
    }
}

/// Response for fetching a conversation transcript.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub conversation_id: String,
    pub title: String,
    pub messages: Vec<MessageResponse>,
}

/// One execution in the listing.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResponse {
    pub execution_id: String,
    #[serde(rename = "type")]
    pub execution_type: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Execution> for ExecutionResponse {
    fn from(e: Execution) -> Self {
        Self {
            execution_id: e.execution_id,
            execution_type: e.execution_type.to_string(),
            title: e.title,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

/// Response envelope for the execution listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionListResponse {
    pub executions: Vec<ExecutionResponse>,
}

/// Query parameters for the execution listing.
#[derive(Debug, Deserialize)]
pub struct ExecutionListQuery {
    #[serde(rename = "type")]
    pub execution_type: Option<String>,
}

/// Billing webhook envelope.
#[derive(Debug, Deserialize, Serialize)]
pub struct BillingWebhookEvent {
    pub event: String,
    pub payload: BillingWebhookPayload,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingWebhookPayload {
    pub user_id: String,
    /// Credits granted alongside the premium upgrade.
    #[serde(default)]
    pub credits: i64,
}
