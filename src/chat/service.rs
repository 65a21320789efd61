//! Asynchronous conversation flows
//!
//! Each operation talks to the backend through [`ApiClient`] and records the
//! outcome in the [`ChatStore`]. Failures are written to `ChatState::error`
//! and also returned, so callers can report them immediately.
//!
//! A service is bound to a [`CancellationToken`] standing for the lifetime of
//! whatever consumes the store. Once it fires, pending requests are dropped
//! and their results never reach the store.

use super::state::ChatAction;
use super::store::ChatStore;
use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, Conversation};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ChatService {
    api: ApiClient,
    store: ChatStore,
    cancel: CancellationToken,
}

impl ChatService {
    pub fn new(api: ApiClient, store: ChatStore, cancel: CancellationToken) -> Self {
        Self { api, store, cancel }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record a failure in the store. A cancelled request only clears its
    /// pending flag through `on_cancel` and leaves `error` alone.
    fn fail(
        &self,
        err: Error,
        action: impl FnOnce(String) -> ChatAction,
        on_cancel: Option<ChatAction>,
    ) -> Error {
        if matches!(err, Error::Cancelled) {
            debug!("Dropping cancelled chat response");
            if let Some(reset) = on_cancel {
                self.store.dispatch(reset);
            }
        } else {
            warn!("{}", err);
            self.store.dispatch(action(err.to_string()));
        }
        err
    }

    pub async fn fetch_conversations(&self) -> Result<Vec<Conversation>> {
        self.store.dispatch(ChatAction::FetchConversationsStart);
        match self.api.list_conversations(&self.cancel).await {
            Ok(conversations) => {
                debug!("Loaded {} conversations", conversations.len());
                self.store
                    .dispatch(ChatAction::FetchConversationsSuccess(conversations.clone()));
                Ok(conversations)
            }
            Err(e) => Err(self.fail(
                e,
                ChatAction::FetchConversationsFailure,
                Some(ChatAction::FetchConversationsCancelled),
            )),
        }
    }

    /// Load the full history of a conversation, replacing what the store holds
    pub async fn fetch_history(&self, conversation_id: i64) -> Result<()> {
        self.store.dispatch(ChatAction::FetchHistoryStart);
        match self
            .api
            .conversation_history(conversation_id, &self.cancel)
            .await
        {
            Ok(history) => {
                let messages = history
                    .into_iter()
                    .map(|m| ChatMessage::new(m.role, m.content, m.timestamp))
                    .collect();
                self.store.dispatch(ChatAction::FetchHistorySuccess {
                    conversation_id,
                    messages,
                });
                Ok(())
            }
            Err(e) => Err(self.fail(
                e,
                ChatAction::FetchHistoryFailure,
                Some(ChatAction::FetchHistoryCancelled),
            )),
        }
    }

    /// Create a conversation; it becomes the first entry and the selection
    pub async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        match self.api.create_conversation(title, &self.cancel).await {
            Ok(conversation) => {
                info!("Created conversation {} ({})", conversation.id, conversation.title);
                self.store
                    .dispatch(ChatAction::CreateConversationSuccess(conversation.clone()));
                Ok(conversation)
            }
            Err(e) => Err(self.fail(e, ChatAction::CreateConversationFailure, None)),
        }
    }

    /// Append the user's message and mark the conversation as sending.
    ///
    /// Runs before any request is made; [`send_message`](Self::send_message)
    /// calls it first.
    pub fn begin_send(&self, conversation_id: i64, question: &str) -> ChatMessage {
        let message = ChatMessage::user(question);
        self.store.dispatch(ChatAction::PushUserMessage {
            conversation_id,
            message: message.clone(),
        });
        self.store.dispatch(ChatAction::SendMessageStart);
        message
    }

    /// Ask a question. The user message stays in the conversation even if the
    /// request fails.
    pub async fn send_message(&self, conversation_id: i64, question: &str) -> Result<ChatMessage> {
        self.begin_send(conversation_id, question);

        match self.api.ask(conversation_id, question, &self.cancel).await {
            Ok(answer) => {
                let assistant = ChatMessage::assistant(answer.response, answer.timestamp);
                self.store.dispatch(ChatAction::SendMessageSuccess {
                    conversation_id,
                    assistant: assistant.clone(),
                });
                Ok(assistant)
            }
            Err(e) => Err(self.fail(
                e,
                ChatAction::SendMessageFailure,
                Some(ChatAction::SendMessageCancelled),
            )),
        }
    }

    pub async fn update_conversation_title(&self, conversation_id: i64, title: &str) -> Result<()> {
        match self
            .api
            .update_conversation_title(conversation_id, title, &self.cancel)
            .await
        {
            Ok(update) => {
                debug!("Conversation {} renamed at {:?}", conversation_id, update.updated_at);
                self.store.dispatch(ChatAction::UpdateConversationTitle {
                    conversation_id,
                    title: title.to_string(),
                });
                Ok(())
            }
            Err(e) => Err(self.fail(e, |msg| ChatAction::SetError(Some(msg)), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::client_for;
    use crate::models::Role;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_for(server: &MockServer) -> ChatService {
        ChatService::new(
            client_for(&server.uri(), Some("jwt")),
            ChatStore::default(),
            CancellationToken::new(),
        )
    }

    async fn mount_create(server: &MockServer, title: &str, id: i64) {
        Mock::given(method("POST"))
            .and(path("/api/AI/conversation"))
            .and(body_json(json!({ "title": title })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": true,
                "data": {
                    "conversationId": id,
                    "title": title,
                    "userId": 1,
                    "createdAt": "2025-01-01T00:00:00Z"
                }
            })))
            .mount(server)
            .await;
    }

    fn ask_response(answer: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "response": answer, "conversationId": 1, "timestamp": "2025-01-01T00:00:05Z" }
        }))
    }

    #[tokio::test]
    async fn test_latest_created_conversation_is_selected_and_empty() {
        let server = MockServer::start().await;
        mount_create(&server, "one", 1).await;
        mount_create(&server, "two", 2).await;
        mount_create(&server, "three", 3).await;

        let service = service_for(&server);
        for (title, id) in [("one", 1), ("two", 2), ("three", 3), ("one", 1)] {
            let created = service.create_conversation(title).await.unwrap();
            assert_eq!(created.id, id);

            let state = service.store().snapshot();
            assert_eq!(state.selected_id, Some(id));
            assert!(state.messages_for(id).is_empty());
            assert_eq!(state.conversations[0].id, id);
        }
    }

    #[tokio::test]
    async fn test_user_message_is_pushed_before_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/AI/ask"))
            .respond_with(ask_response("later").set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;

        let service = service_for(&server);
        let mut rx = service.store().subscribe();
        let task = {
            let service = service.clone();
            tokio::spawn(async move { service.send_message(1, "question").await })
        };

        let state = rx.wait_for(|s| s.sending).await.unwrap().clone();
        let messages = state.messages_for(1);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "question");

        task.await.unwrap().unwrap();
        assert_eq!(service.store().snapshot().messages_for(1).len(), 2);
    }

    #[tokio::test]
    async fn test_send_success_appends_user_then_assistant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/AI/ask"))
            .and(body_json(json!({ "question": "why?", "conversationId": 1 })))
            .respond_with(ask_response("because"))
            .mount(&server)
            .await;

        let service = service_for(&server);
        service.store().dispatch(ChatAction::FetchHistorySuccess {
            conversation_id: 1,
            messages: vec![ChatMessage::user("earlier")],
        });

        let assistant = service.send_message(1, "why?").await.unwrap();
        let state = service.store().snapshot();
        let messages = state.messages_for(1);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "why?");
        assert_eq!(messages[2], assistant);
        assert_eq!(messages[2].timestamp, "2025-01-01T00:00:05Z");
        assert!(!state.sending);
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn test_send_failure_keeps_only_user_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/AI/ask"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({ "message": "LLM unavailable" })),
            )
            .mount(&server)
            .await;

        let service = service_for(&server);
        let err = service.send_message(1, "hello").await.unwrap_err();
        assert_eq!(err.to_string(), "LLM unavailable");

        let state = service.store().snapshot();
        assert_eq!(state.messages_for(1).len(), 1);
        assert_eq!(state.messages_for(1)[0].role, Role::User);
        assert_eq!(state.error.as_deref(), Some("LLM unavailable"));
        assert!(!state.sending);
    }

    #[tokio::test]
    async fn test_fetch_history_twice_is_stable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/AI/conversation/4/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "conversationId": 4,
                    "messages": [
                        { "role": "user", "content": "q", "timestamp": "2025-01-01T00:00:00Z" },
                        { "role": "assistant", "content": "a", "timestamp": "2025-01-01T00:00:01Z" }
                    ],
                    "totalMessages": 2
                }
            })))
            .mount(&server)
            .await;

        let service = service_for(&server);
        service.fetch_history(4).await.unwrap();
        let first = service.store().snapshot().messages_for(4).to_vec();
        service.fetch_history(4).await.unwrap();
        let second = service.store().snapshot().messages_for(4).to_vec();

        let strip = |msgs: &[ChatMessage]| {
            msgs.iter()
                .map(|m| (m.role, m.content.clone(), m.timestamp.clone()))
                .collect::<Vec<_>>()
        };
        assert_eq!(first.len(), 2);
        assert_eq!(strip(&first), strip(&second));
    }

    #[tokio::test]
    async fn test_fetch_conversations_failure_records_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/AI/me/conversations"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "expired" })))
            .mount(&server)
            .await;

        let service = service_for(&server);
        assert!(service.fetch_conversations().await.is_err());
        let state = service.store().snapshot();
        assert_eq!(state.error.as_deref(), Some("expired"));
        assert!(!state.loading_conversations);
    }

    #[tokio::test]
    async fn test_cancelled_send_is_not_applied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/AI/ask"))
            .respond_with(ask_response("too late").set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let service = service_for(&server);
        let trigger = service.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = service.send_message(1, "hello").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        let state = service.store().snapshot();
        assert_eq!(state.messages_for(1).len(), 1);
        assert_eq!(state.error, None);
        assert!(!state.sending);
    }

    #[tokio::test]
    async fn test_cancelled_view_does_not_block_shared_store() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/AI/ask"))
            .and(body_json(json!({ "question": "first", "conversationId": 1 })))
            .respond_with(ask_response("too late").set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/AI/ask"))
            .and(body_json(json!({ "question": "second", "conversationId": 1 })))
            .respond_with(ask_response("on time"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/AI/me/conversations"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "data": { "conversations": [] } }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let store = ChatStore::default();
        let api = client_for(&server.uri(), Some("jwt"));
        let closed = ChatService::new(api.clone(), store.clone(), CancellationToken::new());
        let trigger = closed.cancel_token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let (send, fetch) = tokio::join!(closed.send_message(1, "first"), closed.fetch_conversations());
        assert!(matches!(send, Err(Error::Cancelled)));
        assert!(matches!(fetch, Err(Error::Cancelled)));
        let state = store.snapshot();
        assert!(!state.sending);
        assert!(!state.loading_conversations);
        assert_eq!(state.error, None);

        let open = ChatService::new(api, store.clone(), CancellationToken::new());
        let answer = open.send_message(1, "second").await.unwrap();
        assert_eq!(answer.content, "on time");
        assert_eq!(store.snapshot().messages_for(1).len(), 3);
    }

    #[tokio::test]
    async fn test_rename_updates_title_only() {
        let server = MockServer::start().await;
        mount_create(&server, "draft", 6).await;
        Mock::given(method("PUT"))
            .and(path("/api/AI/conversation/6/update-title"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "conversationId": 6, "title": "final", "updatedAt": "2025-01-02T00:00:00Z" }
            })))
            .mount(&server)
            .await;

        let service = service_for(&server);
        service.create_conversation("draft").await.unwrap();
        service.update_conversation_title(6, "final").await.unwrap();

        let state = service.store().snapshot();
        assert_eq!(state.conversation(6).unwrap().title, "final");
        assert!(state.messages_for(6).is_empty());
    }
}
