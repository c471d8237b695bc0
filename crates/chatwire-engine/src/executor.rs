use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use chatwire_core::ids::ToolCallId;
use chatwire_core::messages::ToolCallBlock;
use chatwire_core::tools::{ToolContext, ToolError};

use crate::registry::ToolRegistry;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of one tool call. Failures carry `{"error": ...}` as output so the
/// model sees them, plus a description for the tool part.
#[derive(Clone, Debug)]
pub struct ToolExecution {
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub output: Value,
    pub error_text: Option<String>,
    pub duration: Duration,
}

impl ToolExecution {
    pub fn success(tool_call_id: ToolCallId, tool_name: String, output: Value) -> Self {
        Self {
            tool_call_id,
            tool_name,
            output,
            error_text: None,
            duration: Duration::ZERO,
        }
    }

    pub fn failure(tool_call_id: ToolCallId, tool_name: String, message: String) -> Self {
        Self {
            tool_call_id,
            tool_name,
            output: json!({ "error": message }),
            error_text: Some(message),
            duration: Duration::ZERO,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_text.is_some()
    }

    /// Tool message content for the next request. Strings go through as-is.
    pub fn history_content(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Runs tool calls against a registry. Never fails: every problem becomes an
/// error result for the model.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Execute one call by name.
    pub async fn execute(
        &self,
        call: &ToolCallBlock,
        cancel: &CancellationToken,
    ) -> ToolExecution {
        run_one(&self.registry, call.clone(), cancel.clone(), self.timeout).await
    }

    /// Execute all calls concurrently and wait for every one of them.
    /// Results come back in the order the calls were declared.
    pub async fn execute_all(
        &self,
        calls: &[ToolCallBlock],
        cancel: &CancellationToken,
    ) -> Vec<ToolExecution> {
        let handles: Vec<_> = calls
            .iter()
            .map(|call| {
                let registry = Arc::clone(&self.registry);
                let call = call.clone();
                let cancel = cancel.clone();
                let timeout = self.timeout;
                tokio::spawn(async move { run_one(&registry, call, cancel, timeout).await })
            })
            .collect();

        let mut results = Vec::with_capacity(calls.len());
        for (call, handle) in calls.iter().zip(handles) {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_err) => {
                    error!(tool = %call.name, error = %join_err, "tool task failed");
                    results.push(ToolExecution::failure(
                        call.id.clone(),
                        call.name.clone(),
                        "tool execution failed".into(),
                    ));
                }
            }
        }
        results
    }
}

async fn run_one(
    registry: &ToolRegistry,
    call: ToolCallBlock,
    cancel: CancellationToken,
    timeout: Duration,
) -> ToolExecution {
    let Some(tool) = registry.get(&call.name) else {
        warn!(tool = %call.name, "model requested unknown tool");
        return ToolExecution::failure(call.id, call.name.clone(), format!("tool not found: {}", call.name));
    };

    let ctx = ToolContext {
        tool_call_id: call.id.clone(),
        abort_signal: cancel,
    };
    let args = call.parsed_arguments();

    let start = Instant::now();
    let result = tokio::time::timeout(
        timeout,
        std::panic::AssertUnwindSafe(tool.execute(args, &ctx)).catch_unwind(),
    )
    .await;
    let duration = start.elapsed();

    let mut execution = match result {
        Ok(Ok(Ok(output))) => ToolExecution::success(call.id, call.name, output),
        Ok(Ok(Err(e))) => {
            debug!(tool = %call.name, error = %e, "tool returned error");
            ToolExecution::failure(call.id, call.name, tool_error_message(e))
        }
        Ok(Err(panic)) => {
            let msg = panic_message(&panic);
            error!(tool = %call.name, panic = %msg, "tool panicked during execution");
            ToolExecution::failure(call.id, call.name, "internal error: tool crashed".into())
        }
        Err(_) => {
            warn!(tool = %call.name, timeout_secs = timeout.as_secs(), "tool timed out");
            let msg = ToolError::Timeout(timeout).to_string();
            ToolExecution::failure(call.id, call.name, msg)
        }
    };
    execution.duration = duration;
    execution
}

/// Failures raised by the tool itself are reported without the variant prefix.
fn tool_error_message(e: ToolError) -> String {
    match e {
        ToolError::ExecutionFailed(msg) => msg,
        other => other.to_string(),
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    panic
        .downcast_ref::<String>()
        .map(|s| s.as_str())
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic")
        .to_string()
}
