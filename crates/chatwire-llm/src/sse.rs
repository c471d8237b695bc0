//! # SSE frame decoding
//!
//! Turns the raw byte stream of a chat-completions response into decoded
//! chunk payloads:
//! - bytes are buffered until a full line is available, so lines (and
//!   multi-byte characters) split across network chunks decode correctly
//! - only `data:` lines are considered; comments and other fields are ignored
//! - the `[DONE]` sentinel is recognised and dropped
//! - a malformed frame is logged and skipped, never fatal

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Future, Stream};
use serde_json::Value;
use tracing::{debug, warn};

use chatwire_core::errors::GatewayError;
use chatwire_core::stream::ChunkPayload;

pub const DONE_SENTINEL: &str = "[DONE]";

/// Line-buffering decoder from response bytes to JSON payloads.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
    /// Prefix of `buffer` already known to hold no newline.
    scanned: usize,
    saw_done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk and return the payloads of every line it
    /// completed. A trailing partial line stays buffered for the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|&b| b == b'\n') {
            let pos = self.scanned + offset;
            let line = self.buffer.split_to(pos + 1);
            self.scanned = 0;
            self.decode_line(&line[..pos], &mut out);
        }
        self.scanned = self.buffer.len();
        out
    }

    /// Decode whatever is left once the transport has ended.
    pub fn finish(&mut self) -> Vec<Value> {
        let rest = self.buffer.split();
        self.scanned = 0;
        let mut out = Vec::new();
        if !rest.is_empty() {
            self.decode_line(&rest, &mut out);
        }
        out
    }

    /// Whether the terminal sentinel has been seen.
    pub fn saw_done(&self) -> bool {
        self.saw_done
    }

    fn decode_line(&mut self, raw: &[u8], out: &mut Vec<Value>) {
        let line = String::from_utf8_lossy(raw);
        let Some(data) = extract_data(&line) else {
            return;
        };
        if data == DONE_SENTINEL {
            self.saw_done = true;
            return;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(value) => out.push(value),
            Err(e) => warn!(
                error = %e,
                data_preview = preview(data, 100),
                "skipping malformed SSE frame"
            ),
        }
    }
}

/// Data payload of an SSE line, or `None` for anything else.
fn extract_data(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data).trim();
    (!data.is_empty()).then_some(data)
}

/// Convert a JSON payload into a typed chunk, logging shape mismatches.
pub fn decode_payload(value: Value) -> Option<ChunkPayload> {
    match serde_json::from_value::<ChunkPayload>(value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(error = %e, "skipping SSE frame with unexpected shape");
            None
        }
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Wraps a response byte stream and yields decoded chunk payloads.
///
/// If no bytes arrive within the idle window the stream yields a
/// `StreamInterrupted` error and ends. An in-stream `{"error": ...}` frame
/// also ends it, as `GatewayError::Provider`.
pub struct SseChunkStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    decoder: FrameDecoder,
    pending: VecDeque<ChunkPayload>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    finished: bool,
}

impl SseChunkStream {
    pub fn new(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            finished: false,
        }
    }

    fn enqueue(&mut self, values: Vec<Value>) {
        self.pending
            .extend(values.into_iter().filter_map(decode_payload));
    }

    fn next_item(&mut self) -> Option<Result<ChunkPayload, GatewayError>> {
        let payload = self.pending.pop_front()?;
        if let Some(message) = payload.error_message() {
            self.finished = true;
            self.pending.clear();
            return Some(Err(GatewayError::Provider(message)));
        }
        Some(Ok(payload))
    }
}

impl Stream for SseChunkStream {
    type Item = Result<ChunkPayload, GatewayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(item) = this.next_item() {
            return Poll::Ready(Some(item));
        }
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let new_deadline = tokio::time::Instant::now() + this.idle_duration;
                    this.idle_deadline.as_mut().reset(new_deadline);

                    let values = this.decoder.push(&bytes);
                    this.enqueue(values);
                    if let Some(item) = this.next_item() {
                        return Poll::Ready(Some(item));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(GatewayError::StreamInterrupted(e.to_string()))));
                }
                Poll::Ready(None) => {
                    let values = this.decoder.finish();
                    this.enqueue(values);
                    this.finished = true;
                    if !this.decoder.saw_done() {
                        debug!("event stream ended without [DONE]");
                    }
                    return Poll::Ready(this.next_item());
                }
                Poll::Pending => {
                    if this.idle_deadline.as_mut().poll(cx).is_ready() {
                        this.finished = true;
                        return Poll::Ready(Some(Err(GatewayError::StreamInterrupted(format!(
                            "idle timeout after {}s",
                            this.idle_duration.as_secs()
                        )))));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
