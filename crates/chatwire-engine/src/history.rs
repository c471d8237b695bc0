use chatwire_core::messages::{strip_reasoning, ChatMessage, HistoryEntry, Role};

/// Build the message list for the first request of a turn.
///
/// The system prompt leads. Messages still streaming are skipped, as are
/// tool-role messages, which only exist inside a turn. Assistant replies go
/// out without their reasoning block.
pub fn build_history(system_prompt: Option<&str>, messages: &[ChatMessage]) -> Vec<HistoryEntry> {
    let mut out = Vec::with_capacity(messages.len() + 1);

    if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
        out.push(HistoryEntry::System {
            content: prompt.to_string(),
        });
    }

    for msg in messages.iter().filter(|m| !m.streaming) {
        match msg.role {
            Role::User => out.push(HistoryEntry::User {
                content: msg.content.clone(),
                attachments: msg.attachments.clone(),
            }),
            Role::Assistant => {
                let content = strip_reasoning(&msg.content);
                if !content.is_empty() {
                    out.push(HistoryEntry::Assistant {
                        content: content.to_string(),
                        tool_calls: Vec::new(),
                    });
                }
            }
            Role::System => out.push(HistoryEntry::System {
                content: msg.content.clone(),
            }),
            Role::Tool => {}
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatwire_core::messages::Attachment;

    #[test]
    fn system_prompt_comes_first() {
        let history = build_history(Some("Be brief."), &[ChatMessage::user("hi", vec![])]);
        assert_eq!(history[0], HistoryEntry::System { content: "Be brief.".into() });
        assert!(matches!(&history[1], HistoryEntry::User { content, .. } if content == "hi"));
    }

    #[test]
    fn blank_system_prompt_is_omitted() {
        let history = build_history(Some("  "), &[ChatMessage::user("hi", vec![])]);
        assert_eq!(history.len(), 1);
        assert!(build_history(None, &[]).is_empty());
    }

    #[test]
    fn streaming_messages_are_skipped() {
        let messages = vec![
            ChatMessage::user("q", vec![]),
            ChatMessage::assistant_placeholder(),
        ];
        let history = build_history(None, &messages);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn reasoning_is_stripped_from_assistant_replies() {
        let messages = vec![
            ChatMessage::user("q", vec![]),
            ChatMessage::assistant_text("<think>\nhmm\n</think>\n\nAnswer"),
            ChatMessage::assistant_text("<think>\nnever finished"),
        ];
        let history = build_history(None, &messages);
        assert_eq!(history.len(), 2);
        assert_eq!(
            history[1],
            HistoryEntry::Assistant { content: "Answer".into(), tool_calls: vec![] }
        );
    }

    #[test]
    fn attachments_are_carried() {
        let attachment = Attachment {
            name: "cat.png".into(),
            mime_type: "image/png".into(),
            url: "/api/v1/attachments/cat".into(),
        };
        let history = build_history(None, &[ChatMessage::user("look", vec![attachment.clone()])]);
        assert!(matches!(&history[0], HistoryEntry::User { attachments, .. } if attachments == &vec![attachment]));
    }
}
