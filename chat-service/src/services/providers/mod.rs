//! Model gateway: provider abstractions and implementations.
//!
//! Each upstream LLM vendor hides its wire protocol behind [`ChatProvider`];
//! the orchestrator only ever sees the internal chunk sequence. New vendors
//! are added by implementing the trait, not by branching in the orchestrator.

pub mod catalog;
pub mod mock;
pub mod openrouter;

use crate::models::MessageRole;
use async_trait::async_trait;
use std::pin::Pin;
use thiserror::Error;
use tokio_stream::Stream;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Upstream idle timeout")]
    Timeout,
}

/// One element of a provider stream. Every stream ends with exactly one
/// terminal item: a `Done` chunk or an `Err`.
#[derive(Debug)]
pub enum StreamChunk {
    /// Incremental text fragment.
    Text(String),

    /// Terminal marker: upstream finished cleanly.
    Done,
}

/// Type alias for provider streams.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// One entry of the conversation history handed to the provider.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Trait for streaming chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Open a streaming completion for the given model and history.
    ///
    /// The returned stream is finite and not restartable; a failure after
    /// partial output surfaces as an `Err` item so the caller can decide
    /// what to do with what it already received.
    async fn stream_chat(
        &self,
        model_id: &str,
        history: &[ChatMessage],
    ) -> Result<ChatStream, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
