use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::ids::{ConversationId, MessageId};
use crate::messages::{ChatMessage, ImageRef, Part};
use crate::usage::Usage;

/// Incremental write to one message. `None` fields leave the stored value
/// untouched.
#[derive(Clone, Debug, Default)]
pub struct MessageUpdate {
    pub content: String,
    pub streaming: bool,
    pub parts: Option<Vec<Part>>,
    pub images: Option<Vec<ImageRef>>,
    pub usage: Option<Usage>,
}

/// The narrow view of the UI message store the engine writes through.
pub trait MessageStore: Send + Sync {
    fn append(&self, message: ChatMessage);
    /// Returns false when no message with `id` exists.
    fn update(&self, id: &MessageId, update: MessageUpdate) -> bool;
    fn get(&self, id: &MessageId) -> Option<ChatMessage>;
    fn messages(&self) -> Vec<ChatMessage>;
    fn set_messages(&self, messages: Vec<ChatMessage>);
    fn active_conversation(&self) -> Option<ConversationId>;
    fn set_active_conversation(&self, id: Option<ConversationId>);
}

#[derive(Default)]
struct StoreState {
    messages: Vec<ChatMessage>,
    active: Option<ConversationId>,
}

/// Process-local store, used by the CLI and by tests.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    updates: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `update` calls so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::Relaxed)
    }
}

impl MessageStore for InMemoryStore {
    fn append(&self, message: ChatMessage) {
        self.state.write().messages.push(message);
    }

    fn update(&self, id: &MessageId, update: MessageUpdate) -> bool {
        let mut state = self.state.write();
        let Some(msg) = state.messages.iter_mut().find(|m| &m.id == id) else {
            return false;
        };
        msg.content = update.content;
        msg.streaming = update.streaming;
        if let Some(parts) = update.parts {
            msg.parts = Some(parts);
        }
        if let Some(images) = update.images {
            msg.images = images;
        }
        if let Some(usage) = update.usage {
            msg.usage = Some(usage);
        }
        self.updates.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn get(&self, id: &MessageId) -> Option<ChatMessage> {
        self.state.read().messages.iter().find(|m| &m.id == id).cloned()
    }

    fn messages(&self) -> Vec<ChatMessage> {
        self.state.read().messages.clone()
    }

    fn set_messages(&self, messages: Vec<ChatMessage>) {
        self.state.write().messages = messages;
    }

    fn active_conversation(&self) -> Option<ConversationId> {
        self.state.read().active.clone()
    }

    fn set_active_conversation(&self, id: Option<ConversationId>) {
        self.state.write().active = id;
    }
}
