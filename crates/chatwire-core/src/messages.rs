use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MessageId, ToolCallId};
use crate::usage::Usage;

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A message as the UI store holds it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    /// Visible text. Assistant messages may start with a `<think>` block.
    pub content: String,
    pub streaming: bool,
    /// Interleaved text/tool segments in the order they happened. `None` for
    /// turns that never called a tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<Vec<Part>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: MessageId::new(),
            role: Role::User,
            content: content.into(),
            streaming: false,
            parts: None,
            images: Vec::new(),
            attachments,
            usage: None,
            created_at: Utc::now(),
        }
    }

    /// Empty assistant message that a turn streams into.
    pub fn assistant_placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: String::new(),
            streaming: true,
            parts: None,
            images: Vec::new(),
            attachments: Vec::new(),
            usage: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            streaming: false,
            ..Self::assistant_placeholder()
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            streaming: false,
            ..Self::assistant_placeholder()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub url: String,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Image produced by the model. Either a self-contained URL or a data URI.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    Text { content: String },
    ToolInvocation(ToolInvocationPart),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputAvailable,
    OutputAvailable,
    OutputError,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocationPart {
    /// `tool-<name>`, used by the renderer to pick a view.
    #[serde(rename = "type")]
    pub part_type: String,
    pub tool_call_id: ToolCallId,
    pub tool_name: String,
    pub state: ToolState,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ToolInvocationPart {
    pub fn pending(call: &ToolCallBlock) -> Self {
        Self {
            part_type: format!("tool-{}", call.name),
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            state: ToolState::InputAvailable,
            input: call.parsed_arguments(),
            output: None,
            error_text: None,
        }
    }
}

/// A finalized tool call as the model requested it. `arguments` is kept as
/// the raw JSON text so it can be echoed back to the gateway verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallBlock {
    pub id: ToolCallId,
    pub name: String,
    pub arguments: String,
}

impl ToolCallBlock {
    /// Parsed arguments, or an empty object when they are blank or malformed.
    pub fn parsed_arguments(&self) -> Value {
        serde_json::from_str(&self.arguments)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }
}

/// One entry of the message list sent to the gateway.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum HistoryEntry {
    System {
        content: String,
    },
    User {
        content: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },
    Assistant {
        content: String,
        #[serde(default)]
        tool_calls: Vec<ToolCallBlock>,
    },
    Tool {
        tool_call_id: ToolCallId,
        name: String,
        content: String,
    },
}

/// Render reasoning and answer text as one visible string.
///
/// While only reasoning exists the block is left open, which tells the
/// renderer the model is still thinking.
pub fn render_with_reasoning(reasoning: &str, content: &str) -> String {
    if reasoning.is_empty() {
        return content.to_string();
    }
    if content.is_empty() {
        format!("{THINK_OPEN}\n{reasoning}")
    } else {
        format!("{THINK_OPEN}\n{reasoning}\n{THINK_CLOSE}\n\n{content}")
    }
}

/// Strip a leading `<think>` block, returning only the answer text.
pub fn strip_reasoning(content: &str) -> &str {
    let trimmed = content.trim_start();
    let Some(rest) = trimmed.strip_prefix(THINK_OPEN) else {
        return content;
    };
    match rest.find(THINK_CLOSE) {
        Some(end) => rest[end + THINK_CLOSE.len()..].trim_start(),
        None => "",
    }
}
