use async_trait::async_trait;
use chrono::{Local, SecondsFormat, Utc};
use serde_json::{json, Value};

use chatwire_core::tools::{Tool, ToolContext, ToolError};

/// Reports the current wall-clock time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time, in UTC or the machine's local timezone"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "enum": ["utc", "local"],
                    "description": "Which clock to read (default: utc)"
                }
            }
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let zone = args.get("timezone").and_then(Value::as_str).unwrap_or("utc");

        let iso = match zone {
            "utc" => Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "local" => Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unknown timezone: {other} (expected utc or local)"
                )))
            }
        };
        tracing::debug!(zone, %iso, "current_time");

        Ok(json!({
            "timezone": zone,
            "iso8601": iso,
            "unix": Utc::now().timestamp(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwire_core::ids::ToolCallId;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> ToolContext {
        ToolContext {
            tool_call_id: ToolCallId::new(),
            abort_signal: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn defaults_to_utc() {
        let out = CurrentTimeTool.execute(json!({}), &ctx()).await.unwrap();
        assert_eq!(out["timezone"], "utc");
        assert!(out["iso8601"].as_str().unwrap().ends_with('Z'));
        assert!(out["unix"].as_i64().unwrap() > 1_600_000_000);
    }

    #[tokio::test]
    async fn local_clock() {
        let out = CurrentTimeTool
            .execute(json!({"timezone": "local"}), &ctx())
            .await
            .unwrap();
        assert_eq!(out["timezone"], "local");
    }

    #[tokio::test]
    async fn unknown_zone_is_rejected() {
        let err = CurrentTimeTool
            .execute(json!({"timezone": "mars"}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
