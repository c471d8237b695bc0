//! Message store that echoes the streaming reply to a terminal.

use std::collections::HashMap;
use std::io::Write;

use parking_lot::Mutex;

use chatwire_core::ids::{ConversationId, MessageId, ToolCallId};
use chatwire_core::messages::{strip_reasoning, ChatMessage, Part, ToolState};
use chatwire_core::store::{InMemoryStore, MessageStore, MessageUpdate};

#[derive(Default)]
struct Progress {
    /// Bytes of answer text already written.
    printed: usize,
    /// Tool calls already announced.
    announced: Vec<ToolCallId>,
}

/// Wraps [`InMemoryStore`] and writes each new slice of answer text to `out`
/// as updates arrive. Reasoning is not echoed.
pub struct ConsoleStore<W> {
    inner: InMemoryStore,
    out: Mutex<W>,
    progress: Mutex<HashMap<MessageId, Progress>>,
}

impl<W: Write + Send> ConsoleStore<W> {
    pub fn new(out: W) -> Self {
        Self {
            inner: InMemoryStore::new(),
            out: Mutex::new(out),
            progress: Mutex::new(HashMap::new()),
        }
    }

    fn echo(&self, id: &MessageId, update: &MessageUpdate) {
        let answer = strip_reasoning(&update.content);
        let mut progress = self.progress.lock();
        let entry = progress.entry(id.clone()).or_default();
        let mut out = self.out.lock();

        if let Some(parts) = &update.parts {
            for part in parts {
                let Part::ToolInvocation(tool) = part else {
                    continue;
                };
                if tool.state == ToolState::InputAvailable
                    || entry.announced.contains(&tool.tool_call_id)
                {
                    continue;
                }
                let status = if tool.state == ToolState::OutputError { "failed" } else { "done" };
                let _ = writeln!(out, "\n[tool {} {status}]", tool.tool_name);
                entry.announced.push(tool.tool_call_id.clone());
            }
        }

        // Answer text only grows within a turn; anything else is a rewrite
        // we cannot express on a terminal, so just resync.
        if answer.len() > entry.printed && answer.is_char_boundary(entry.printed) {
            let _ = out.write_all(answer[entry.printed..].as_bytes());
        }
        entry.printed = answer.len();
        if !update.streaming {
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> MessageStore for ConsoleStore<W> {
    fn append(&self, message: ChatMessage) {
        self.inner.append(message);
    }

    fn update(&self, id: &MessageId, update: MessageUpdate) -> bool {
        self.echo(id, &update);
        self.inner.update(id, update)
    }

    fn get(&self, id: &MessageId) -> Option<ChatMessage> {
        self.inner.get(id)
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.inner.messages()
    }

    fn set_messages(&self, messages: Vec<ChatMessage>) {
        self.inner.set_messages(messages);
    }

    fn active_conversation(&self) -> Option<ConversationId> {
        self.inner.active_conversation()
    }

    fn set_active_conversation(&self, id: Option<ConversationId>) {
        self.inner.set_active_conversation(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwire_core::messages::{ToolCallBlock, ToolInvocationPart};
    use serde_json::json;

    fn update(content: &str, streaming: bool) -> MessageUpdate {
        MessageUpdate {
            content: content.to_string(),
            streaming,
            ..Default::default()
        }
    }

    #[test]
    fn prints_only_new_text() {
        let store = ConsoleStore::new(Vec::new());
        let msg = ChatMessage::assistant_placeholder();
        let id = msg.id.clone();
        store.append(msg);

        assert!(store.update(&id, update("Hel", true)));
        assert!(store.update(&id, update("Hello", true)));
        assert!(store.update(&id, update("Hello world", false)));

        assert_eq!(store.get(&id).unwrap().content, "Hello world");
        let printed = String::from_utf8(store.into_inner()).unwrap();
        assert_eq!(printed, "Hello world\n");
    }

    #[test]
    fn reasoning_is_not_echoed() {
        let store = ConsoleStore::new(Vec::new());
        let msg = ChatMessage::assistant_placeholder();
        let id = msg.id.clone();
        store.append(msg);

        store.update(&id, update("<think>\nplanning", true));
        store.update(&id, update("<think>\nplanning\n</think>\n\nAnswer", false));

        let printed = String::from_utf8(store.into_inner()).unwrap();
        assert_eq!(printed, "Answer\n");
    }

    #[test]
    fn finished_tools_are_announced_once() {
        let store = ConsoleStore::new(Vec::new());
        let msg = ChatMessage::assistant_placeholder();
        let id = msg.id.clone();
        store.append(msg);

        let call = ToolCallBlock {
            id: ToolCallId::from_raw("call_1"),
            name: "current_time".into(),
            arguments: "{}".into(),
        };
        let pending = ToolInvocationPart::pending(&call);
        let mut done = pending.clone();
        done.state = ToolState::OutputAvailable;
        done.output = Some(json!({"unix": 1}));

        let with_parts = |part: ToolInvocationPart| MessageUpdate {
            streaming: true,
            parts: Some(vec![Part::ToolInvocation(part)]),
            ..Default::default()
        };
        store.update(&id, with_parts(pending));
        store.update(&id, with_parts(done.clone()));
        store.update(&id, with_parts(done));

        let printed = String::from_utf8(store.into_inner()).unwrap();
        assert_eq!(printed.matches("[tool current_time done]").count(), 1);
    }
}
