use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::errors::GatewayError;
use crate::messages::HistoryEntry;
use crate::stream::ChunkPayload;
use crate::tools::ToolDefinition;

/// Decoded chunk payloads of one streamed response. An `Err` item is a
/// transport failure; decode failures never reach the consumer.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChunkPayload, GatewayError>> + Send>>;

/// One chat-completions request. Always streamed.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<HistoryEntry>,
    pub tools: Vec<ToolDefinition>,
}

/// A chat-completions endpoint that answers with an event stream.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Issue the request. A non-2xx response is returned as `Err` with the
    /// most specific message available.
    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream, GatewayError>;
}
