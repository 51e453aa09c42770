//! User model: identity plus the credit counter the ledger mutates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A registered user.
///
/// `credits` is only ever mutated through the conditional UPDATEs in the
/// credit ledger; `is_premium` is only set by a verified payment webhook.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub credits: i64,
    pub is_premium: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
