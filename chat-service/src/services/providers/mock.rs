//! Mock provider for development and integration tests.
//!
//! The latest user message selects the behavior through markers, so tests
//! can drive every failure mode without a live upstream:
//!
//! - `[fail:before]`  - error before any output is produced
//! - `[fail:partial]` - some output, then an error mid-stream
//! - `[slow]`         - chunks paced out over a few seconds

use super::{ChatMessage, ChatProvider, ChatStream, ProviderError, StreamChunk};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

pub struct MockChatProvider;

impl MockChatProvider {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn stream_chat(
        &self,
        model_id: &str,
        history: &[ChatMessage],
    ) -> Result<ChatStream, ProviderError> {
        let prompt = history.last().map(|m| m.content.as_str()).unwrap_or("");

        if prompt.contains("[fail:before]") {
            let items = vec![Err(ProviderError::ApiError(
                "Mock upstream failure".to_string(),
            ))];
            return Ok(Box::pin(tokio_stream::iter(items)) as ChatStream);
        }

        if prompt.contains("[fail:partial]") {
            let items = vec![
                Ok(StreamChunk::Text("Partial ".to_string())),
                Ok(StreamChunk::Text("answer".to_string())),
                Err(ProviderError::NetworkError(
                    "Mock connection dropped".to_string(),
                )),
            ];
            return Ok(Box::pin(tokio_stream::iter(items)) as ChatStream);
        }

        if prompt.contains("[slow]") {
            let (tx, rx) = mpsc::channel(32);
            tokio::spawn(async move {
                for i in 0..8 {
                    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
                    if tx
                        .send(Ok(StreamChunk::Text(format!("chunk-{} ", i))))
                        .await
                        .is_err()
                    {
                        // Receiver side gone; keep producing is pointless here,
                        // the mock just stops.
                        return;
                    }
                }
                let _ = tx.send(Ok(StreamChunk::Done)).await;
            });
            return Ok(Box::pin(ReceiverStream::new(rx)) as ChatStream);
        }

        // Default: echo the prompt back in a few chunks.
        let mut items = vec![Ok(StreamChunk::Text(format!(
            "Mock response from {}: ",
            model_id
        )))];
        for word in prompt.split_whitespace().take(8) {
            items.push(Ok(StreamChunk::Text(format!("{} ", word))));
        }
        items.push(Ok(StreamChunk::Done));

        Ok(Box::pin(tokio_stream::iter(items)) as ChatStream)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
