use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use chatwire_core::errors::GatewayError;
use chatwire_core::ids::{ConversationId, MessageId};
use chatwire_core::messages::HistoryEntry;
use chatwire_core::provider::{ChatProvider, ChatRequest, ChunkStream};
use chatwire_core::store::MessageStore;
use chatwire_core::usage::Usage;

use crate::accumulator::StreamState;
use crate::executor::{ToolExecutor, DEFAULT_TOOL_TIMEOUT};
use crate::registry::{ToolFilter, ToolRegistry};
use crate::scheduler::{UpdateScheduler, DEFAULT_FLUSH_INTERVAL};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Configuration for the tool loop.
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    pub max_iterations: u32,
    pub flush_interval: Duration,
    pub tool_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// How a turn ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model answered without requesting further tools.
    Completed,
    /// The model was still calling tools when the iteration budget ran out.
    IterationLimit,
    /// A transport failure ended the turn; the message is in the content.
    Failed { message: String },
    /// Stopped by the user.
    Aborted,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnReport {
    pub message_id: MessageId,
    pub conversation_id: Option<ConversationId>,
    pub outcome: TurnOutcome,
    pub iterations: u32,
    pub usage: Usage,
}

/// Inputs for one turn.
pub struct TurnParams {
    /// The assistant message the turn streams into. Must already be in the store.
    pub message_id: MessageId,
    pub conversation_id: Option<ConversationId>,
    pub model: String,
    pub history: Vec<HistoryEntry>,
}

enum StreamEnd {
    Finished,
    Aborted,
    Failed(GatewayError),
}

/// Writes the turn's message to the store at the scheduler's pace.
struct Flusher<'a> {
    store: &'a dyn MessageStore,
    message_id: &'a MessageId,
    scheduler: UpdateScheduler,
}

impl Flusher<'_> {
    fn changed(&mut self, state: &StreamState) {
        if self.scheduler.note_change(Instant::now()) {
            self.flush(state);
        }
    }

    fn flush(&mut self, state: &StreamState) {
        self.write(state, true);
    }

    /// Unconditional terminal write.
    fn finalize(&mut self, state: &StreamState) {
        self.scheduler.cancel_pending();
        self.write(state, false);
    }

    fn write(&mut self, state: &StreamState, streaming: bool) {
        if !self.store.update(self.message_id, state.snapshot(streaming)) {
            warn!(message_id = %self.message_id, "assistant message missing from store");
        }
        self.scheduler.mark_flushed(Instant::now());
    }
}

/// Drives one turn: request, stream, run tools, repeat.
pub struct TurnRunner {
    provider: Arc<dyn ChatProvider>,
    executor: ToolExecutor,
    store: Arc<dyn MessageStore>,
    tool_filter: ToolFilter,
    config: RunnerConfig,
}

impl TurnRunner {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn MessageStore>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            provider,
            executor: ToolExecutor::new(registry).with_timeout(config.tool_timeout),
            store,
            tool_filter: ToolFilter::All,
            config,
        }
    }

    pub fn with_tool_filter(mut self, filter: ToolFilter) -> Self {
        self.tool_filter = filter;
        self
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run a turn to completion. Every outcome, including failure, finalizes
    /// the message exactly once with `streaming = false`.
    #[instrument(skip_all, fields(message_id = %params.message_id, model = %params.model))]
    pub async fn run(&self, params: TurnParams, cancel: &CancellationToken) -> TurnReport {
        let TurnParams {
            message_id,
            conversation_id,
            model,
            mut history,
        } = params;

        let mut state = StreamState::new();
        let mut flusher = Flusher {
            store: self.store.as_ref(),
            message_id: &message_id,
            scheduler: UpdateScheduler::new(self.config.flush_interval),
        };
        let tools = self.executor.registry().definitions(&self.tool_filter);
        let max_iterations = self.config.max_iterations.max(1);
        let mut iterations = 0u32;

        let outcome = loop {
            if cancel.is_cancelled() {
                break TurnOutcome::Aborted;
            }
            iterations += 1;
            debug!(iteration = iterations, messages = history.len(), "issuing request");

            let request = ChatRequest {
                model: model.clone(),
                messages: history.clone(),
                tools: tools.clone(),
            };

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => break TurnOutcome::Aborted,
                result = self.provider.stream(&request) => result,
            };
            let mut stream = match opened {
                Ok(stream) => stream,
                Err(e) => break failed(e, iterations),
            };

            match consume(&mut stream, &mut state, &mut flusher, cancel).await {
                StreamEnd::Finished => {}
                StreamEnd::Aborted => break TurnOutcome::Aborted,
                StreamEnd::Failed(e) => break failed(e, iterations),
            }
            drop(stream);

            let preamble = state.text_since_iteration_start().to_string();
            let calls = state.finish_iteration();
            if calls.is_empty() {
                break TurnOutcome::Completed;
            }

            debug!(iteration = iterations, tool_calls = calls.len(), "model requested tools");
            state.record_tool_calls(&calls);
            flusher.flush(&state);
            history.push(HistoryEntry::Assistant {
                content: preamble,
                tool_calls: calls.clone(),
            });

            let results = self.executor.execute_all(&calls, cancel).await;
            for result in &results {
                state.apply_tool_result(result);
            }
            flusher.flush(&state);
            history.extend(results.into_iter().map(|r| HistoryEntry::Tool {
                content: r.history_content(),
                tool_call_id: r.tool_call_id,
                name: r.tool_name,
            }));

            if cancel.is_cancelled() {
                break TurnOutcome::Aborted;
            }
            if iterations >= max_iterations {
                state.append_note(&iteration_limit_note(max_iterations));
                break TurnOutcome::IterationLimit;
            }
        };

        // Keeps usage and images of an interrupted response; its unfinished
        // tool calls are dropped.
        state.finish_iteration();
        if let TurnOutcome::Failed { message } = &outcome {
            state.append_note(&format!("Error: {message}"));
        }
        state.close_text_segment();
        flusher.finalize(&state);

        let usage = state.usage();
        info!(
            outcome = ?outcome,
            iterations,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "turn finished"
        );

        TurnReport {
            message_id,
            conversation_id,
            outcome,
            iterations,
            usage,
        }
    }
}

async fn consume(
    stream: &mut ChunkStream,
    state: &mut StreamState,
    flusher: &mut Flusher<'_>,
    cancel: &CancellationToken,
) -> StreamEnd {
    loop {
        let deadline = flusher.scheduler.deadline();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamEnd::Aborted,
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                flusher.flush(state);
            }
            item = stream.next() => match item {
                Some(Ok(payload)) => {
                    if state.apply(&payload) {
                        flusher.changed(state);
                    }
                }
                Some(Err(e)) => return StreamEnd::Failed(e),
                None => return StreamEnd::Finished,
            },
        }
    }
}

fn failed(error: GatewayError, iteration: u32) -> TurnOutcome {
    warn!(iteration, error_kind = error.error_kind(), error = %error, "turn failed");
    TurnOutcome::Failed {
        message: error.to_string(),
    }
}

fn iteration_limit_note(max: u32) -> String {
    format!("[Reached the maximum of {max} tool iterations; stopping here.]")
}
