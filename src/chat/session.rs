//! The chat view: what happens on entry and on each user action

use super::service::ChatService;
use super::state::ChatAction;
use crate::config::ChatConfig;
use crate::error::{Error, Result};
use crate::models::{ChatMessage, Conversation};
use crate::navigation::{FileOpen, Navigation};
use chrono::Local;
use tracing::{debug, info};

/// Result of entering the chat view
#[derive(Debug, Clone, PartialEq)]
pub enum Entered {
    /// Nothing selected and no conversations exist
    Empty,
    /// Resumed an existing conversation and loaded its history
    Resumed(i64),
    /// Opened a fresh conversation about a file and asked the summary question
    FileChat {
        conversation: Conversation,
        answer: ChatMessage,
    },
}

#[derive(Debug, Clone)]
pub struct ChatSession {
    service: ChatService,
    config: ChatConfig,
}

impl ChatSession {
    pub fn new(service: ChatService, config: ChatConfig) -> Self {
        Self { service, config }
    }

    pub fn service(&self) -> &ChatService {
        &self.service
    }

    /// Enter the view. A pending file open in `navigation` is consumed here
    /// and handled exactly once.
    pub async fn enter(&self, navigation: &mut Navigation) -> Result<Entered> {
        let file = navigation.take_file_open();
        let conversations = self.service.fetch_conversations().await?;

        if let Some(file) = file {
            return self.open_file(file).await;
        }

        let target = self
            .service
            .store()
            .with(|s| s.selected_id)
            .or_else(|| conversations.first().map(|c| c.id));
        match target {
            Some(id) => {
                self.service.fetch_history(id).await?;
                Ok(Entered::Resumed(id))
            }
            None => Ok(Entered::Empty),
        }
    }

    async fn open_file(&self, file: FileOpen) -> Result<Entered> {
        info!("Starting a conversation about {}", file.file_name);
        let conversation = self.service.create_conversation(&file.file_name).await?;
        let store = self.service.store();
        store.dispatch(ChatAction::SelectConversation(conversation.id));
        store.dispatch(ChatAction::ResetMessagesFor(conversation.id));

        let cancel = self.service.cancel_token();
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(self.config.file_prompt_delay()) => {}
        }

        let question = self.config.file_prompt(&file.file_name);
        debug!("Asking about file {} in source {}", file.file_id, file.source_id);
        let answer = self.service.send_message(conversation.id, &question).await?;
        Ok(Entered::FileChat {
            conversation,
            answer,
        })
    }

    /// Switch to a conversation and load its history
    pub async fn select(&self, conversation_id: i64) -> Result<()> {
        self.service
            .store()
            .dispatch(ChatAction::SelectConversation(conversation_id));
        self.service.fetch_history(conversation_id).await
    }

    /// Create a conversation titled with the prefix and the local time
    pub async fn new_conversation(&self) -> Result<Conversation> {
        let title = format!(
            "{} - {}",
            self.config.new_conversation_prefix,
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let conversation = self.service.create_conversation(&title).await?;
        self.service
            .store()
            .dispatch(ChatAction::ResetMessagesFor(conversation.id));
        Ok(conversation)
    }

    /// Send user input to the selected conversation.
    ///
    /// Returns `Ok(None)` without sending when the input is blank, nothing is
    /// selected, or a previous message is still in flight.
    pub async fn submit(&self, input: &str) -> Result<Option<ChatMessage>> {
        let question = input.trim();
        if question.is_empty() {
            return Ok(None);
        }
        let (selected, sending) = self
            .service
            .store()
            .with(|s| (s.selected_id, s.sending));
        let Some(conversation_id) = selected else {
            return Ok(None);
        };
        if sending {
            debug!("Ignoring input while a message is in flight");
            return Ok(None);
        }
        self.service
            .send_message(conversation_id, question)
            .await
            .map(Some)
    }

    pub async fn rename(&self, conversation_id: i64, title: &str) -> Result<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation("The title cannot be empty".to_string()));
        }
        self.service
            .update_conversation_title(conversation_id, title)
            .await
    }

    /// Delete a conversation and refresh the list. When the deleted
    /// conversation was selected, the new first entry is selected instead.
    pub async fn delete_and_refresh(&self, conversation_id: i64) -> Result<()> {
        let was_selected = self.service.store().with(|s| s.selected_id) == Some(conversation_id);
        self.service
            .api()
            .delete_conversation(conversation_id, self.service.cancel_token())
            .await?;
        info!("Deleted conversation {}", conversation_id);

        let conversations = self.service.fetch_conversations().await?;
        if was_selected {
            if let Some(next) = conversations.first() {
                self.select(next.id).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::client_for;
    use crate::chat::ChatStore;
    use crate::models::Role;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_for(server: &MockServer) -> ChatSession {
        let service = ChatService::new(
            client_for(&server.uri(), Some("jwt")),
            ChatStore::default(),
            CancellationToken::new(),
        );
        let config = ChatConfig {
            file_prompt_delay_ms: 10,
            ..ChatConfig::default()
        };
        ChatSession::new(service, config)
    }

    async fn mount_list(server: &MockServer, ids: &[i64]) {
        let conversations: Vec<_> = ids
            .iter()
            .map(|id| json!({ "id": id, "title": format!("c{}", id), "created_at": "2025-01-01T00:00:00Z" }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/AI/me/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "userId": 1, "conversations": conversations }
            })))
            .mount(server)
            .await;
    }

    async fn mount_history(server: &MockServer, id: i64) {
        Mock::given(method("GET"))
            .and(path(format!("/api/AI/conversation/{}/history", id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "conversationId": id,
                    "messages": [{ "role": "user", "content": "old", "timestamp": "2025-01-01T00:00:00Z" }],
                    "totalMessages": 1
                }
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_enter_without_payload_loads_first_history() {
        let server = MockServer::start().await;
        mount_list(&server, &[8, 3]).await;
        mount_history(&server, 8).await;

        let session = session_for(&server);
        let entered = session.enter(&mut Navigation::new()).await.unwrap();
        assert_eq!(entered, Entered::Resumed(8));
        assert_eq!(session.service().store().snapshot().selected_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_file_open_is_processed_once() {
        let server = MockServer::start().await;
        mount_list(&server, &[]).await;
        Mock::given(method("POST"))
            .and(path("/api/AI/conversation"))
            .and(body_json(json!({ "title": "plan.pdf" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "success": true,
                "data": { "conversationId": 11, "title": "plan.pdf", "userId": 1, "createdAt": "2025-01-01T00:00:00Z" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/AI/ask"))
            .and(body_json(json!({
                "question": ChatConfig::default().file_prompt("plan.pdf"),
                "conversationId": 11
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "response": "It is a plan." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let mut nav = Navigation::open_file(FileOpen {
            source_id: 2,
            file_id: "f1".to_string(),
            file_name: "plan.pdf".to_string(),
        });

        let first = session.enter(&mut nav).await.unwrap();
        match first {
            Entered::FileChat {
                conversation,
                answer,
            } => {
                assert_eq!(conversation.id, 11);
                assert_eq!(answer.content, "It is a plan.");
            }
            other => panic!("expected a file chat, got {:?}", other),
        }

        // Entering again with the same navigation must not create another conversation
        let second = session.enter(&mut nav).await;
        assert!(!matches!(second, Ok(Entered::FileChat { .. })));

        let state = session.service().store().snapshot();
        assert_eq!(state.selected_id, Some(11));
        let roles: Vec<_> = state.messages_for(11).iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_submit_ignores_blank_and_unselected() {
        let server = MockServer::start().await;
        let session = session_for(&server);

        assert_eq!(session.submit("   ").await.unwrap(), None);
        assert_eq!(session.submit("hello").await.unwrap(), None);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_ignored_while_sending() {
        let server = MockServer::start().await;
        let session = session_for(&server);
        let store = session.service().store();
        store.dispatch(ChatAction::SelectConversation(1));
        store.dispatch(ChatAction::SendMessageStart);

        assert_eq!(session.submit("again").await.unwrap(), None);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rename_rejects_blank_title() {
        let server = MockServer::start().await;
        let session = session_for(&server);
        let err = session.rename(1, "  ").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_selected_moves_to_first() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/AI/conversation/delete"))
            .and(body_json(json!({ "conversationId": 5 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;
        mount_list(&server, &[9, 4]).await;
        mount_history(&server, 9).await;

        let session = session_for(&server);
        session
            .service()
            .store()
            .dispatch(ChatAction::SelectConversation(5));

        session.delete_and_refresh(5).await.unwrap();
        let state = session.service().store().snapshot();
        assert_eq!(state.selected_id, Some(9));
        assert_eq!(state.messages_for(9).len(), 1);
    }
}
