//! `/api/AI/*` routes: conversations, history and questions

use super::{ApiClient, ApiRequest};
use crate::error::Result;
use crate::models::{Conversation, Envelope, Role};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationList {
    #[serde(default)]
    conversations: Vec<Conversation>,
}

/// A message as stored by the backend (no client id yet)
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct History {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedConversation {
    conversation_id: i64,
    title: String,
    #[serde(default)]
    created_at: Option<String>,
}

/// Assistant answer to a question
#[derive(Debug, Clone, Deserialize)]
pub struct Answer {
    pub response: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Confirmation of a title change
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleUpdate {
    pub conversation_id: i64,
    pub title: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ApiClient {
    pub async fn list_conversations(&self, cancel: &CancellationToken) -> Result<Vec<Conversation>> {
        let response: Envelope<ConversationList> = self
            .fetch_cancellable(
                "/api/AI/me/conversations",
                ApiRequest::get().authenticated(),
                cancel,
            )
            .await?;
        Ok(response.data.conversations)
    }

    /// Ordered message history of a conversation
    pub async fn conversation_history(
        &self,
        conversation_id: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<HistoryMessage>> {
        let response: Envelope<History> = self
            .fetch_cancellable(
                &format!("/api/AI/conversation/{}/history", conversation_id),
                ApiRequest::get().authenticated(),
                cancel,
            )
            .await?;
        Ok(response.data.messages)
    }

    pub async fn create_conversation(
        &self,
        title: &str,
        cancel: &CancellationToken,
    ) -> Result<Conversation> {
        let response: Envelope<CreatedConversation> = self
            .fetch_cancellable(
                "/api/AI/conversation",
                ApiRequest::post()
                    .json(&json!({ "title": title }))
                    .authenticated(),
                cancel,
            )
            .await?;
        let created = response.data;
        Ok(Conversation {
            id: created.conversation_id,
            title: created.title,
            created_at: created
                .created_at
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        })
    }

    pub async fn update_conversation_title(
        &self,
        conversation_id: i64,
        title: &str,
        cancel: &CancellationToken,
    ) -> Result<TitleUpdate> {
        let response: Envelope<TitleUpdate> = self
            .fetch_cancellable(
                &format!("/api/AI/conversation/{}/update-title", conversation_id),
                ApiRequest::put()
                    .json(&json!({ "title": title }))
                    .authenticated(),
                cancel,
            )
            .await?;
        Ok(response.data)
    }

    pub async fn delete_conversation(
        &self,
        conversation_id: i64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .fetch_cancellable(
                "/api/AI/conversation/delete",
                ApiRequest::post()
                    .json(&json!({ "conversationId": conversation_id }))
                    .authenticated(),
                cancel,
            )
            .await?;
        Ok(())
    }

    /// Ask the RAG backend a question within a conversation
    pub async fn ask(
        &self,
        conversation_id: i64,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<Answer> {
        let response: Envelope<Answer> = self
            .fetch_cancellable(
                "/api/AI/ask",
                ApiRequest::post()
                    .json(&json!({ "question": question, "conversationId": conversation_id }))
                    .authenticated(),
                cancel,
            )
            .await?;
        Ok(response.data)
    }
}
