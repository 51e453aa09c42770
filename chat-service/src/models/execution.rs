//! Execution model: a persisted conversation or app invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of execution. Conversations come from the chat UI; app invocations
/// from the one-shot apps (article summarizer and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionType {
    Conversation,
    AppInvocation,
}

impl ExecutionType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "CONVERSATION",
            Self::AppInvocation => "APP_INVOCATION",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CONVERSATION" => Some(Self::Conversation),
            "APP_INVOCATION" => Some(Self::AppInvocation),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution record. Messages live in their own table and are loaded only
/// for detail views, never for listings.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub user_id: String,
    pub execution_type: ExecutionType,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_type_round_trips_through_str() {
        for ty in [ExecutionType::Conversation, ExecutionType::AppInvocation] {
            assert_eq!(ExecutionType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(ExecutionType::parse("bogus"), None);
    }
}
