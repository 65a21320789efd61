use super::state::{ChatAction, ChatState};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::trace;

/// Shared, observable holder of [`ChatState`]
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct ChatStore {
    tx: Arc<watch::Sender<ChatState>>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new(ChatState::default())
    }
}

impl ChatStore {
    pub fn new(initial: ChatState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Apply an action and notify subscribers
    pub fn dispatch(&self, action: ChatAction) {
        trace!("dispatch {:?}", action);
        self.tx.send_modify(|state| state.apply(action));
    }

    /// A copy of the current state
    pub fn snapshot(&self) -> ChatState {
        self.tx.borrow().clone()
    }

    /// Read the current state without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.tx.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatMessage;

    #[tokio::test]
    async fn test_subscribers_see_dispatches() {
        let store = ChatStore::default();
        let mut rx = store.subscribe();

        store.dispatch(ChatAction::PushUserMessage {
            conversation_id: 1,
            message: ChatMessage::user("hi"),
        });

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().messages_for(1).len(), 1);
        assert_eq!(store.with(|s| s.messages_for(1).len()), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let store = ChatStore::default();
        let other = store.clone();
        other.dispatch(ChatAction::SelectConversation(5));
        assert_eq!(store.snapshot().selected_id, Some(5));
    }
}
