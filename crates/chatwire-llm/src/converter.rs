use serde_json::{json, Value};

use chatwire_core::messages::{Attachment, HistoryEntry, ToolCallBlock};
use chatwire_core::provider::ChatRequest;
use chatwire_core::tools::ToolDefinition;

/// Convert a ChatRequest into the chat-completions request body.
pub fn build_request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "stream": true,
        "messages": convert_messages(&request.messages),
    });

    if !request.tools.is_empty() {
        body["tools"] = json!(request.tools.iter().map(convert_tool).collect::<Vec<_>>());
    }

    body
}

fn convert_tool(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters_schema,
        }
    })
}

fn convert_messages(messages: &[HistoryEntry]) -> Vec<Value> {
    messages.iter().map(convert_message).collect()
}

fn convert_message(entry: &HistoryEntry) -> Value {
    match entry {
        HistoryEntry::System { content } => json!({"role": "system", "content": content}),
        HistoryEntry::User { content, attachments } => convert_user_message(content, attachments),
        HistoryEntry::Assistant { content, tool_calls } => {
            convert_assistant_message(content, tool_calls)
        }
        HistoryEntry::Tool { tool_call_id, name, content } => json!({
            "role": "tool",
            "tool_call_id": tool_call_id,
            "name": name,
            "content": content,
        }),
    }
}

/// Plain string content unless attachments force the multi-part form.
fn convert_user_message(content: &str, attachments: &[Attachment]) -> Value {
    if attachments.is_empty() {
        return json!({"role": "user", "content": content});
    }

    let mut text = content.to_string();
    let mut images = Vec::new();
    for attachment in attachments {
        if attachment.is_image() {
            images.push(json!({"type": "image_url", "image_url": {"url": attachment.url}}));
        } else {
            text.push_str(&format!(
                "\n\n[Attached file: {} ({}) {}]",
                attachment.name, attachment.mime_type, attachment.url
            ));
        }
    }

    if images.is_empty() {
        return json!({"role": "user", "content": text});
    }

    let mut parts = vec![json!({"type": "text", "text": text})];
    parts.extend(images);
    json!({"role": "user", "content": parts})
}

fn convert_assistant_message(content: &str, tool_calls: &[ToolCallBlock]) -> Value {
    if tool_calls.is_empty() {
        return json!({"role": "assistant", "content": content});
    }

    let calls: Vec<Value> = tool_calls.iter().map(convert_tool_call).collect();
    // Some gateways reject an empty string next to tool_calls.
    let content = if content.is_empty() { Value::Null } else { json!(content) };
    json!({"role": "assistant", "content": content, "tool_calls": calls})
}

fn convert_tool_call(tc: &ToolCallBlock) -> Value {
    json!({
        "id": tc.id,
        "type": "function",
        "function": {
            "name": tc.name,
            "arguments": tc.arguments,
        }
    })
}
