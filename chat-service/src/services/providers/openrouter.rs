//! OpenRouter provider implementation.
//!
//! Speaks the OpenAI-compatible `chat/completions` SSE protocol. One
//! provider instance serves every model in the catalog; OpenRouter routes
//! on the model id.

use super::{ChatMessage, ChatProvider, ChatStream, ProviderError, StreamChunk};
use crate::models::MessageRole;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// OpenRouter provider configuration.
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    /// Abort the upstream call if no bytes arrive within this window.
    pub idle_timeout: Duration,
}

pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    client: Client,
}

impl OpenRouterProvider {
    pub fn new(config: OpenRouterConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    fn wire_messages(history: &[ChatMessage]) -> Vec<WireMessage> {
        history
            .iter()
            .map(|m| WireMessage {
                role: match m.role {
                    MessageRole::User => "user",
                    MessageRole::Agent => "assistant",
                },
                content: m.content.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    async fn stream_chat(
        &self,
        model_id: &str,
        history: &[ChatMessage],
    ) -> Result<ChatStream, ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "OpenRouter API key not configured".to_string(),
            ));
        }

        let request = ChatCompletionRequest {
            model: model_id.to_string(),
            messages: Self::wire_messages(history),
            stream: true,
        };

        tracing::debug!(
            model = %model_id,
            history_len = history.len(),
            "Starting streaming request to OpenRouter"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "OpenRouter API error {}: {}",
                status, error_text
            )));
        }

        let idle_timeout = self.config.idle_timeout;
        let (tx, rx) = mpsc::channel(32);

        // Process the SSE byte stream in its own task; the idle timeout wraps
        // every poll so a stalled upstream cannot hold a turn open forever.
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            loop {
                let next = tokio::time::timeout(idle_timeout, stream.next()).await;

                let chunk_result = match next {
                    Ok(Some(r)) => r,
                    Ok(None) => break,
                    Err(_) => {
                        let _ = tx.send(Err(ProviderError::Timeout)).await;
                        return;
                    }
                };

                match chunk_result {
                    Ok(chunk) => {
                        buffer.push_str(&String::from_utf8_lossy(&chunk));

                        // Process complete SSE events
                        while let Some(event_end) = buffer.find("\n\n") {
                            let event = buffer[..event_end].to_string();
                            buffer = buffer[event_end + 2..].to_string();

                            for line in event.lines() {
                                let Some(data) = line.strip_prefix("data: ") else {
                                    continue;
                                };

                                if data.trim() == "[DONE]" {
                                    let _ = tx.send(Ok(StreamChunk::Done)).await;
                                    return;
                                }

                                if let Ok(parsed) =
                                    serde_json::from_str::<ChatCompletionChunk>(data)
                                {
                                    if let Some(text) = parsed
                                        .choices
                                        .first()
                                        .and_then(|c| c.delta.content.as_deref())
                                    {
                                        if !text.is_empty() {
                                            let _ = tx
                                                .send(Ok(StreamChunk::Text(text.to_string())))
                                                .await;
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::NetworkError(e.to_string())))
                            .await;
                        return;
                    }
                }
            }

            // Upstream closed without a [DONE] sentinel; treat as complete.
            let _ = tx.send(Ok(StreamChunk::Done)).await;
        });

        Ok(Box::pin(ReceiverStream::new(rx)) as ChatStream)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "OpenRouter API key not configured".to_string(),
            ));
        }

        let url = format!("{}/models", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}
