use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;

use chatwire_core::errors::GatewayError;
use chatwire_core::provider::{ChatProvider, ChatRequest, ChunkStream};
use chatwire_core::stream::ChunkPayload;

/// Pre-programmed responses for deterministic testing without a gateway.
pub enum MockResponse {
    /// Yield these chunks, then end.
    Chunks(Vec<ChunkPayload>),
    /// Yield these chunks, then a transport error.
    ChunksThenError(Vec<ChunkPayload>, GatewayError),
    /// Return an error from the stream() call itself, like a non-2xx reply.
    Error(GatewayError),
    /// Wait a duration, then resolve the inner response.
    Delay(Duration, Box<MockResponse>),
    /// Yield these chunks, then stay open forever.
    Hang(Vec<ChunkPayload>),
    /// Sleep before each chunk.
    Paced(Duration, Vec<ChunkPayload>),
}

impl MockResponse {
    /// A plain-text reply split into the given deltas.
    pub fn text(deltas: &[&str]) -> Self {
        Self::Chunks(deltas.iter().map(|d| chunk::content(d)).collect())
    }

    /// A reply that requests one tool call, with arguments split into fragments.
    pub fn tool_call(id: &str, name: &str, argument_fragments: &[&str]) -> Self {
        let mut chunks = vec![chunk::tool_call_delta(0, Some(id), Some(name), "")];
        chunks.extend(
            argument_fragments
                .iter()
                .map(|f| chunk::tool_call_delta(0, None, None, f)),
        );
        Self::Chunks(chunks)
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Provider that replays responses in order and records every request.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChunkStream, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());

        let Some(response) = self.responses.lock().pop_front() else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        resolve_response(response).await
    }
}

/// Resolve a MockResponse, sleeping through any Delay wrappers first.
async fn resolve_response(response: MockResponse) -> Result<ChunkStream, GatewayError> {
    let mut current = response;
    loop {
        match current {
            MockResponse::Chunks(chunks) => {
                return Ok(Box::pin(stream::iter(chunks.into_iter().map(Ok))));
            }
            MockResponse::ChunksThenError(chunks, error) => {
                let items = chunks.into_iter().map(Ok).chain(std::iter::once(Err(error)));
                return Ok(Box::pin(stream::iter(items)));
            }
            MockResponse::Error(e) => return Err(e),
            MockResponse::Delay(duration, inner) => {
                tokio::time::sleep(duration).await;
                current = *inner;
            }
            MockResponse::Hang(chunks) => {
                let s = stream::iter(chunks.into_iter().map(Ok)).chain(stream::pending());
                return Ok(Box::pin(s));
            }
            MockResponse::Paced(interval, chunks) => {
                let s = stream::iter(chunks).then(move |c| async move {
                    tokio::time::sleep(interval).await;
                    Ok(c)
                });
                return Ok(Box::pin(s));
            }
        }
    }
}

/// Builders for single chunk payloads.
pub mod chunk {
    use chatwire_core::stream::{
        ChunkChoice, ChunkPayload, Delta, FunctionDelta, ImageDelta, ImageUrl, ToolCallDelta,
        UsagePayload,
    };

    fn with_delta(delta: Delta) -> ChunkPayload {
        ChunkPayload {
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            ..Default::default()
        }
    }

    pub fn content(text: &str) -> ChunkPayload {
        with_delta(Delta {
            content: Some(text.to_string()),
            ..Default::default()
        })
    }

    pub fn reasoning(text: &str) -> ChunkPayload {
        with_delta(Delta {
            reasoning_content: Some(text.to_string()),
            ..Default::default()
        })
    }

    pub fn tool_call_delta(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: &str,
    ) -> ChunkPayload {
        with_delta(Delta {
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.map(String::from),
                function: Some(FunctionDelta {
                    name: name.map(String::from),
                    arguments: Some(arguments.to_string()),
                }),
            }],
            ..Default::default()
        })
    }

    pub fn image(index: usize, url: &str) -> ChunkPayload {
        with_delta(Delta {
            images: vec![ImageDelta::Object {
                index: Some(index),
                image_url: ImageUrl { url: url.to_string() },
            }],
            ..Default::default()
        })
    }

    pub fn usage(prompt_tokens: u64, completion_tokens: u64) -> ChunkPayload {
        ChunkPayload {
            usage: Some(UsagePayload {
                prompt_tokens: Some(prompt_tokens),
                completion_tokens: Some(completion_tokens),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
