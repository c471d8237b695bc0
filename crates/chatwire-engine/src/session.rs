//! Session controller: owns the cancellation token of the one turn a chat
//! session may have in flight, and wires user actions to the turn runner.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use chatwire_core::ids::{MessageId, TurnId};
use chatwire_core::messages::{Attachment, ChatMessage, HistoryEntry, Role};
use chatwire_core::store::MessageStore;

use crate::error::EngineError;
use crate::history::build_history;
use crate::runner::{TurnParams, TurnReport, TurnRunner};

struct ActiveTurn {
    id: TurnId,
    message_id: MessageId,
    cancel: CancellationToken,
}

/// Clears the active slot when its turn ends, unless a newer turn took it.
struct ActiveGuard<'a> {
    slot: &'a Mutex<Option<ActiveTurn>>,
    id: TurnId,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|t| t.id == self.id) {
            *slot = None;
        }
    }
}

pub struct SessionController {
    runner: Arc<TurnRunner>,
    active: Mutex<Option<ActiveTurn>>,
}

impl SessionController {
    pub fn new(runner: Arc<TurnRunner>) -> Self {
        Self {
            runner,
            active: Mutex::new(None),
        }
    }

    fn store(&self) -> &Arc<dyn MessageStore> {
        self.runner.store()
    }

    /// Send a user message and stream the reply into a new assistant message.
    ///
    /// `history` is the conversation before this message. Resolves when the
    /// turn has finalized.
    pub async fn send_message(
        &self,
        content: &str,
        model: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
        attachments: Vec<Attachment>,
    ) -> TurnReport {
        let user = ChatMessage::user(content, attachments);
        let mut outgoing = build_history(system_prompt, history);
        outgoing.push(HistoryEntry::User {
            content: user.content.clone(),
            attachments: user.attachments.clone(),
        });
        self.store().append(user);

        self.run_turn(model, outgoing).await
    }

    /// Replace an assistant reply with a fresh one.
    ///
    /// The store is truncated to the messages before `message_id` and the
    /// conversation up to the preceding user message is replayed.
    pub async fn regenerate(
        &self,
        message_id: &MessageId,
        model: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<TurnReport, EngineError> {
        let idx = history
            .iter()
            .position(|m| &m.id == message_id)
            .ok_or_else(|| EngineError::UnknownMessage(message_id.to_string()))?;

        let prior = &history[..idx];
        if history[idx].role != Role::Assistant || !prior.iter().any(|m| m.role == Role::User) {
            return Err(EngineError::NotRegenerable(message_id.to_string()));
        }

        debug!(%message_id, kept = prior.len(), "truncating for regenerate");
        self.store().set_messages(prior.to_vec());

        let outgoing = build_history(system_prompt, prior);
        Ok(self.run_turn(model, outgoing).await)
    }

    /// Abort the in-flight turn, if any. Returns whether one was running.
    pub fn stop_streaming(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(turn) => {
                info!(turn_id = %turn.id, message_id = %turn.message_id, "stopping turn");
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Assistant message of the in-flight turn.
    pub fn streaming_message_id(&self) -> Option<MessageId> {
        self.active.lock().as_ref().map(|t| t.message_id.clone())
    }

    async fn run_turn(&self, model: &str, history: Vec<HistoryEntry>) -> TurnReport {
        let placeholder = ChatMessage::assistant_placeholder();
        let message_id = placeholder.id.clone();
        let conversation_id = self.store().active_conversation();
        self.store().append(placeholder);

        let (cancel, _guard) = self.begin(message_id.clone());

        let params = TurnParams {
            message_id,
            conversation_id,
            model: model.to_string(),
            history,
        };
        self.runner.run(params, &cancel).await
    }

    /// Install a new active turn, cancelling any previous one.
    fn begin(&self, message_id: MessageId) -> (CancellationToken, ActiveGuard<'_>) {
        let id = TurnId::new();
        let cancel = CancellationToken::new();
        let previous = self.active.lock().replace(ActiveTurn {
            id: id.clone(),
            message_id,
            cancel: cancel.clone(),
        });
        if let Some(previous) = previous {
            info!(turn_id = %previous.id, "new turn supersedes in-flight turn");
            previous.cancel.cancel();
        }
        (cancel, ActiveGuard { slot: &self.active, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chatwire_core::ids::ConversationId;
    use chatwire_core::store::InMemoryStore;
    use chatwire_llm::mock::chunk;
    use chatwire_llm::{MockProvider, MockResponse};

    use crate::registry::ToolRegistry;
    use crate::runner::{RunnerConfig, TurnOutcome};

    fn controller(responses: Vec<MockResponse>) -> (Arc<SessionController>, Arc<MockProvider>, Arc<InMemoryStore>) {
        let provider = Arc::new(MockProvider::new(responses));
        let store = Arc::new(InMemoryStore::new());
        let runner = TurnRunner::new(
            provider.clone(),
            Arc::new(ToolRegistry::new()),
            store.clone(),
            RunnerConfig::default(),
        );
        (Arc::new(SessionController::new(Arc::new(runner))), provider, store)
    }

    #[tokio::test]
    async fn send_appends_user_and_assistant() {
        let (session, provider, store) = controller(vec![MockResponse::text(&["Hi there"])]);
        let report = session
            .send_message("hello", "m", &[], Some("You are helpful."), vec![])
            .await;

        assert_eq!(report.outcome, TurnOutcome::Completed);
        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[1].id, report.message_id);
        assert_eq!(messages[1].content, "Hi there");
        assert!(!messages[1].streaming);

        let sent = &provider.requests()[0].messages;
        assert!(matches!(&sent[0], HistoryEntry::System { content } if content == "You are helpful."));
        assert!(matches!(&sent[1], HistoryEntry::User { content, .. } if content == "hello"));
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn turn_is_tagged_with_active_conversation() {
        let (session, _, store) = controller(vec![MockResponse::text(&["ok"])]);
        let conv = ConversationId::new();
        store.set_active_conversation(Some(conv.clone()));
        let report = session.send_message("hi", "m", &[], None, vec![]).await;
        assert_eq!(report.conversation_id, Some(conv));
    }

    #[tokio::test]
    async fn stop_streaming_aborts_turn() {
        tokio::time::pause();
        let (session, provider, store) =
            controller(vec![MockResponse::Hang(vec![chunk::content("partial")])]);

        let task = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send_message("hi", "m", &[], None, vec![]).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.is_streaming());
        assert!(session.streaming_message_id().is_some());
        assert!(session.stop_streaming());

        let report = task.await.unwrap();
        assert_eq!(report.outcome, TurnOutcome::Aborted);
        let reply = store.get(&report.message_id).unwrap();
        assert_eq!(reply.content, "partial");
        assert!(!reply.streaming);
        assert_eq!(provider.call_count(), 1);
        assert!(!session.is_streaming());
        assert!(!session.stop_streaming());
    }

    #[tokio::test]
    async fn new_turn_cancels_previous() {
        tokio::time::pause();
        let (session, _, store) = controller(vec![
            MockResponse::Hang(vec![chunk::content("first")]),
            MockResponse::text(&["second"]),
        ]);

        let first = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send_message("one", "m", &[], None, vec![]).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = session.send_message("two", "m", &[], None, vec![]).await;
        let first = first.await.unwrap();

        assert_eq!(first.outcome, TurnOutcome::Aborted);
        assert_eq!(second.outcome, TurnOutcome::Completed);
        assert!(!store.get(&first.message_id).unwrap().streaming);
        assert_eq!(store.get(&second.message_id).unwrap().content, "second");
        assert!(!session.is_streaming());
    }

    #[tokio::test]
    async fn regenerate_truncates_and_replays() {
        let (session, provider, store) = controller(vec![
            MockResponse::text(&["first answer"]),
            MockResponse::text(&["better answer"]),
        ]);
        let first = session.send_message("question", "m", &[], None, vec![]).await;

        let history = store.messages();
        let report = session
            .regenerate(&first.message_id, "m", &history, None)
            .await
            .unwrap();

        let messages = store.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "question");
        assert_eq!(messages[1].id, report.message_id);
        assert_eq!(messages[1].content, "better answer");

        let replayed = &provider.requests()[1].messages;
        assert_eq!(replayed.len(), 1);
        assert!(matches!(&replayed[0], HistoryEntry::User { content, .. } if content == "question"));
    }

    #[tokio::test]
    async fn regenerate_rejects_unknown_and_user_ids() {
        let (session, provider, _) = controller(vec![]);
        let user = ChatMessage::user("q", vec![]);
        let history = vec![user.clone()];

        let err = session
            .regenerate(&MessageId::new(), "m", &history, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownMessage(_)));

        let err = session.regenerate(&user.id, "m", &history, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotRegenerable(_)));
        assert_eq!(provider.call_count(), 0);
    }
}
