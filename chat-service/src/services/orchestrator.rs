//! Chat turn orchestrator.
//!
//! Drives one chat turn through its full lifecycle: validate, reserve
//! credit, stream from the provider, then persist the transcript and
//! settle the credit. The streaming phase runs in a dedicated task that
//! owns the turn; a client disconnect stops delivery but never the turn
//! itself, so the transcript and the ledger always reflect what the model
//! actually produced.

use crate::models::{ExecutionType, MessageRole};
use crate::services::database::Database;
use crate::services::ledger::{CreditLedger, Reservation};
use crate::services::metrics::{CHAT_TURNS_TOTAL, TURN_DURATION};
use crate::services::providers::{catalog, ChatMessage, ChatProvider, ProviderError, StreamChunk};
use dashmap::DashMap;
use service_core::error::AppError;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::instrument;
use uuid::Uuid;

/// Events delivered to the client over SSE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// Incremental model output.
    Chunk(String),
    /// Terminal: the turn completed and was persisted.
    Done,
    /// Terminal: the turn failed; the message says why.
    Error(String),
}

/// Everything resolved up front for one turn, before any bytes stream.
struct TurnContext {
    user_id: String,
    model_id: String,
    execution_id: String,
    message: String,
    reservation: Reservation,
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    db: Database,
    ledger: CreditLedger,
    provider: Arc<dyn ChatProvider>,
    turn_cost: i64,
    /// Per-execution append locks so concurrent turns against the same
    /// conversation serialize their transcript writes.
    execution_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ChatOrchestrator {
    pub fn new(
        db: Database,
        ledger: CreditLedger,
        provider: Arc<dyn ChatProvider>,
        turn_cost: i64,
    ) -> Self {
        Self {
            db,
            ledger,
            provider,
            turn_cost,
            execution_locks: Arc::new(DashMap::new()),
        }
    }

    /// Start a chat turn.
    ///
    /// Validation, entitlement checks and the credit reservation all happen
    /// before this returns, so every failure in that phase surfaces as a
    /// plain HTTP error rather than an in-stream event. On success the
    /// streaming phase is already running in its own task and the returned
    /// receiver yields its events.
    #[instrument(skip(self, message), fields(user_id = %user_id, model = %model_id))]
    pub async fn start_turn(
        &self,
        user_id: &str,
        model_id: &str,
        execution_id: Option<&str>,
        message: &str,
    ) -> Result<ReceiverStream<TurnEvent>, AppError> {
        let model = catalog::find(model_id).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!("Unknown model: {}", model_id))
        })?;

        if model.is_premium && !self.ledger.is_premium(user_id).await? {
            return Err(AppError::Forbidden(anyhow::anyhow!(
                "Model '{}' requires a premium plan",
                model_id
            )));
        }

        let execution_id = match execution_id {
            Some(id) if !id.is_empty() => {
                // Conversation ids are client-generated UUIDs; anything else
                // is rejected before it can become a stored execution id.
                Uuid::parse_str(id).map_err(|_| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "Invalid conversation id: expected a UUID"
                    ))
                })?;

                // Resuming a conversation: it must belong to the caller.
                if let Some(execution) = self.db.get_execution(id).await? {
                    if execution.user_id != user_id {
                        return Err(AppError::Forbidden(anyhow::anyhow!(
                            "Execution does not belong to the authenticated user"
                        )));
                    }
                }
                id.to_string()
            }
            _ => Uuid::new_v4().to_string(),
        };

        let reservation = self.ledger.check_and_reserve(user_id, self.turn_cost).await?;

        let ctx = TurnContext {
            user_id: user_id.to_string(),
            model_id: model_id.to_string(),
            execution_id,
            message: message.to_string(),
            reservation,
        };

        let (tx, rx) = mpsc::channel(32);
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run_turn(ctx, tx).await;
        });

        Ok(ReceiverStream::new(rx))
    }

    /// The streaming phase. Owns the turn from the provider call through
    /// settlement; `tx` closing (client disconnect) only mutes delivery.
    async fn run_turn(&self, ctx: TurnContext, tx: mpsc::Sender<TurnEvent>) {
        let timer = TURN_DURATION
            .with_label_values(&[&ctx.model_id])
            .start_timer();

        let mut history = match self.load_history(&ctx.execution_id).await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, execution_id = %ctx.execution_id, "Failed to load history");
                if let Err(refund_err) = self.ledger.refund(ctx.reservation).await {
                    tracing::error!(error = %refund_err, "Failed to refund reservation");
                }
                let _ = tx
                    .send(TurnEvent::Error("Failed to load conversation".to_string()))
                    .await;
                CHAT_TURNS_TOTAL.with_label_values(&["failed"]).inc();
                timer.observe_duration();
                return;
            }
        };
        history.push(ChatMessage {
            role: MessageRole::User,
            content: ctx.message.clone(),
        });

        let mut buffer = String::new();
        let mut client_gone = false;
        let mut provider_error: Option<ProviderError> = None;

        match self.provider.stream_chat(&ctx.model_id, &history).await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(StreamChunk::Text(text)) => {
                            buffer.push_str(&text);
                            if !client_gone && tx.send(TurnEvent::Chunk(text)).await.is_err() {
                                // Client went away; keep draining so the
                                // transcript captures the full response.
                                client_gone = true;
                                tracing::info!(
                                    execution_id = %ctx.execution_id,
                                    "Client disconnected mid-stream, continuing turn"
                                );
                            }
                        }
                        Ok(StreamChunk::Done) => break,
                        Err(e) => {
                            provider_error = Some(e);
                            break;
                        }
                    }
                }
            }
            Err(e) => provider_error = Some(e),
        }

        let execution_id = ctx.execution_id.clone();
        self.finalize_turn(ctx, buffer, provider_error, &tx).await;

        // Drop the append lock entry once no other in-flight turn holds it,
        // so the map does not accumulate one entry per execution ever seen.
        self.execution_locks
            .remove_if(&execution_id, |_, lock| Arc::strong_count(lock) == 1);

        timer.observe_duration();
    }

    /// Persist the transcript and settle the credit. Runs under the
    /// execution's append lock so interleaved turns keep message order.
    async fn finalize_turn(
        &self,
        ctx: TurnContext,
        buffer: String,
        provider_error: Option<ProviderError>,
        tx: &mpsc::Sender<TurnEvent>,
    ) {
        let lock = self
            .execution_locks
            .entry(ctx.execution_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let persisted = self.persist_transcript(&ctx, &buffer).await;

        if let Err(e) = persisted {
            tracing::error!(
                error = %e,
                execution_id = %ctx.execution_id,
                "Failed to persist transcript"
            );
            // The model ran; the credit stays spent even though storage
            // failed, and the client is told the turn did not land.
            self.ledger.commit(ctx.reservation);
            let _ = tx
                .send(TurnEvent::Error("Failed to save conversation".to_string()))
                .await;
            CHAT_TURNS_TOTAL.with_label_values(&["failed"]).inc();
            return;
        }

        match provider_error {
            None => {
                self.ledger.commit(ctx.reservation);
                let _ = tx.send(TurnEvent::Done).await;
                CHAT_TURNS_TOTAL.with_label_values(&["completed"]).inc();
            }
            Some(e) if buffer.is_empty() => {
                // Nothing was produced: the user pays nothing for this turn.
                tracing::warn!(error = %e, execution_id = %ctx.execution_id, "Turn failed with no output");
                if let Err(refund_err) = self.ledger.refund(ctx.reservation).await {
                    tracing::error!(error = %refund_err, "Failed to refund reservation");
                }
                let _ = tx.send(TurnEvent::Error(client_message(&e))).await;
                CHAT_TURNS_TOTAL.with_label_values(&["failed"]).inc();
            }
            Some(e) => {
                // Partial output was delivered and persisted; the turn is
                // charged.
                tracing::warn!(error = %e, execution_id = %ctx.execution_id, "Turn failed after partial output");
                self.ledger.commit(ctx.reservation);
                let _ = tx.send(TurnEvent::Error(client_message(&e))).await;
                CHAT_TURNS_TOTAL.with_label_values(&["partial"]).inc();
            }
        }
    }

    async fn persist_transcript(&self, ctx: &TurnContext, buffer: &str) -> Result<(), AppError> {
        self.db
            .get_or_create_execution(&ctx.user_id, &ctx.execution_id, ExecutionType::Conversation)
            .await?;

        self.db
            .append_message(&ctx.execution_id, MessageRole::User, &ctx.message)
            .await?;

        if !buffer.is_empty() {
            self.db
                .append_message(&ctx.execution_id, MessageRole::Agent, buffer)
                .await?;
        }

        Ok(())
    }

    async fn load_history(&self, execution_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        let messages = self.db.list_messages(execution_id).await?;
        Ok(messages
            .into_iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content,
            })
            .collect())
    }
}

/// User-facing message for a failed turn. The full error goes to the logs,
/// never to the client.
fn client_message(error: &ProviderError) -> String {
    match error {
        ProviderError::RateLimited => {
            "The model is currently rate limited. Please try again shortly.".to_string()
        }
        ProviderError::Timeout => "The model took too long to respond.".to_string(),
        _ => "Failed to process chat message".to_string(),
    }
}
