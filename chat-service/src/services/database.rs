//! Database service for chat-service.
//!
//! All SQL lives here. Credit mutations are single conditional UPDATE
//! statements so they stay correct under concurrent turns and across
//! multiple server processes.

use crate::models::{Execution, ExecutionType, Message, MessageRole, User};
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::Utc;
use service_core::error::AppError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{info, instrument};
use uuid::Uuid;

/// Executions keep at most this many characters of the first user message
/// as their inferred title.
const TITLE_MAX_CHARS: usize = 60;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection pool and run pending migrations.
    #[instrument(skip(database_url), fields(service = "chat-service"))]
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self, AppError> {
        info!(max_connections = max_connections, "Connecting to SQLite");

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;

        info!("SQLite connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database health.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // User operations
    // -------------------------------------------------------------------------

    /// Create a new user with an initial credit grant.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn create_user(
        &self,
        email: &str,
        credits: i64,
        is_premium: bool,
    ) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let now = Utc::now();
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (user_id, email, credits, is_premium, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            RETURNING user_id, email, credits, is_premium, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(credits)
        .bind(is_premium)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("User with email '{}' already exists", email))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create user: {}", e)),
        })?;

        timer.observe_duration();

        info!(user_id = %user.user_id, "User created");

        Ok(user)
    }

    /// Look up a user by id.
    pub async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT user_id, email, credits, is_premium, created_at, updated_at
            FROM users
            WHERE user_id = ?1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find user: {}", e)))?;

        Ok(user)
    }

    /// Atomically debit `amount` credits if the balance covers it.
    ///
    /// Premium users pass the check without being debited. Returns the
    /// user's premium flag when the debit (or premium pass) applied, `None`
    /// when the conditional UPDATE matched no row — the caller distinguishes
    /// an unknown user from an insufficient balance.
    #[instrument(skip(self), fields(user_id = %user_id, amount = amount))]
    pub async fn debit_credits_if_sufficient(
        &self,
        user_id: &str,
        amount: i64,
    ) -> Result<Option<bool>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["debit_credits"])
            .start_timer();

        let is_premium: Option<bool> = sqlx::query_scalar(
            r#"
            UPDATE users
            SET credits = CASE WHEN is_premium THEN credits ELSE credits - ?1 END,
                updated_at = ?2
            WHERE user_id = ?3 AND (is_premium OR credits >= ?1)
            RETURNING is_premium
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to debit credits: {}", e)))?;

        timer.observe_duration();

        Ok(is_premium)
    }

    /// Add credits back to a user (webhook top-up or reservation refund).
    #[instrument(skip(self), fields(user_id = %user_id, amount = amount))]
    pub async fn add_credits(&self, user_id: &str, amount: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_credits"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE users
            SET credits = credits + ?1, updated_at = ?2
            WHERE user_id = ?3
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add credits: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "User '{}' not found",
                user_id
            )));
        }

        Ok(())
    }

    /// Mark a user premium and optionally top up credits. Only the billing
    /// webhook calls this, after signature verification.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn grant_premium(&self, user_id: &str, bonus_credits: i64) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_premium = 1, credits = credits + ?1, updated_at = ?2
            WHERE user_id = ?3
            "#,
        )
        .bind(bonus_credits)
        .bind(Utc::now())
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to grant premium: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "User '{}' not found",
                user_id
            )));
        }

        info!(user_id = %user_id, "Premium entitlement granted");

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Execution operations
    // -------------------------------------------------------------------------

    /// Return the execution if it exists and belongs to `user_id`, create it
    /// with the given id otherwise. An execution owned by someone else is
    /// `Forbidden`.
    #[instrument(skip(self), fields(user_id = %user_id, execution_id = %execution_id))]
    pub async fn get_or_create_execution(
        &self,
        user_id: &str,
        execution_id: &str,
        execution_type: ExecutionType,
    ) -> Result<Execution, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_or_create_execution"])
            .start_timer();

        if let Some(existing) = self.get_execution(execution_id).await? {
            timer.observe_duration();
            if existing.user_id != user_id {
                return Err(AppError::Forbidden(anyhow::anyhow!(
                    "Execution belongs to another user"
                )));
            }
            return Ok(existing);
        }

        let now = Utc::now();
        let execution = sqlx::query_as::<_, Execution>(
            r#"
            INSERT INTO executions (execution_id, user_id, execution_type, title, created_at, updated_at)
            VALUES (?1, ?2, ?3, '', ?4, ?4)
            RETURNING execution_id, user_id, execution_type, title, created_at, updated_at
            "#,
        )
        .bind(execution_id)
        .bind(user_id)
        .bind(execution_type)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create execution: {}", e)))?;

        timer.observe_duration();

        info!(execution_id = %execution.execution_id, "Execution created");

        Ok(execution)
    }

    /// Look up a single execution by id.
    pub async fn get_execution(&self, execution_id: &str) -> Result<Option<Execution>, AppError> {
        let execution = sqlx::query_as::<_, Execution>(
            r#"
            SELECT execution_id, user_id, execution_type, title, created_at, updated_at
            FROM executions
            WHERE execution_id = ?1
            "#,
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get execution: {}", e)))?;

        Ok(execution)
    }

    /// Append one message and bump the execution's `updated_at` in a single
    /// transaction. The first user message also seeds the execution title.
    #[instrument(skip(self, content), fields(execution_id = %execution_id, role = %role))]
    pub async fn append_message(
        &self,
        execution_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<Message, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["append_message"])
            .start_timer();

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (message_id, execution_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING message_id, execution_id, role, content, created_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(execution_id)
        .bind(role)
        .bind(content)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to append message: {}", e)))?;

        let title_candidate = match role {
            MessageRole::User => infer_title(content),
            MessageRole::Agent => String::new(),
        };

        sqlx::query(
            r#"
            UPDATE executions
            SET updated_at = ?1,
                title = CASE WHEN title = '' AND ?2 != '' THEN ?2 ELSE title END
            WHERE execution_id = ?3
            "#,
        )
        .bind(now)
        .bind(&title_candidate)
        .bind(execution_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to touch execution: {}", e)))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(message)
    }

    /// Ordered message history for an execution (insertion order).
    pub async fn list_messages(&self, execution_id: &str) -> Result<Vec<Message>, AppError> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT message_id, execution_id, role, content, created_at
            FROM messages
            WHERE execution_id = ?1
            ORDER BY created_at, rowid
            "#,
        )
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list messages: {}", e)))?;

        Ok(messages)
    }

    /// List a user's executions, most recently updated first.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_executions(
        &self,
        user_id: &str,
        execution_type: Option<ExecutionType>,
    ) -> Result<Vec<Execution>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_executions"])
            .start_timer();

        let executions = sqlx::query_as::<_, Execution>(
            r#"
            SELECT execution_id, user_id, execution_type, title, created_at, updated_at
            FROM executions
            WHERE user_id = ?1
              AND (?2 IS NULL OR execution_type = ?2)
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .bind(execution_type)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list executions: {}", e)))?;

        timer.observe_duration();

        Ok(executions)
    }

    /// Delete an execution and its messages. Explicit user action only.
    #[instrument(skip(self), fields(execution_id = %execution_id))]
    pub async fn delete_execution(&self, execution_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM executions WHERE execution_id = ?1")
            .bind(execution_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete execution: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}

/// Derive an execution title from the first user message.
fn infer_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        trimmed.to_string()
    } else {
        let truncated: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        format!("{}...", truncated.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_titles_pass_through() {
        assert_eq!(infer_title("  hello world  "), "hello world");
    }

    #[test]
    fn long_titles_are_truncated() {
        let long = "x".repeat(200);
        let title = infer_title(&long);
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }
}
