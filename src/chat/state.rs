//! Conversation state and its reducer

use crate::models::{ChatMessage, Conversation};
use serde::Serialize;
use std::collections::HashMap;

/// Everything the chat view knows about conversations
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatState {
    pub conversations: Vec<Conversation>,
    pub selected_id: Option<i64>,
    /// Message lists keyed by conversation id. May briefly hold ids that
    /// are not (yet) in `conversations`.
    pub messages_by_conv: HashMap<i64, Vec<ChatMessage>>,
    pub loading_conversations: bool,
    pub loading_history: bool,
    pub sending: bool,
    pub error: Option<String>,
}

/// State transitions. `ChatState::apply` is the only way state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatAction {
    SelectConversation(i64),
    PushUserMessage {
        conversation_id: i64,
        message: ChatMessage,
    },
    ResetMessagesFor(i64),
    SetError(Option<String>),
    UpdateConversationTitle {
        conversation_id: i64,
        title: String,
    },

    FetchConversationsStart,
    FetchConversationsSuccess(Vec<Conversation>),
    FetchConversationsFailure(String),
    FetchConversationsCancelled,

    FetchHistoryStart,
    FetchHistorySuccess {
        conversation_id: i64,
        messages: Vec<ChatMessage>,
    },
    FetchHistoryFailure(String),
    FetchHistoryCancelled,

    CreateConversationSuccess(Conversation),
    CreateConversationFailure(String),

    SendMessageStart,
    SendMessageSuccess {
        conversation_id: i64,
        assistant: ChatMessage,
    },
    SendMessageFailure(String),
    SendMessageCancelled,
}

impl ChatState {
    pub fn apply(&mut self, action: ChatAction) {
        match action {
            ChatAction::SelectConversation(id) => {
                self.selected_id = Some(id);
                self.error = None;
            }
            ChatAction::PushUserMessage {
                conversation_id,
                message,
            } => {
                self.messages_by_conv
                    .entry(conversation_id)
                    .or_default()
                    .push(message);
            }
            ChatAction::ResetMessagesFor(id) => {
                self.messages_by_conv.insert(id, Vec::new());
            }
            ChatAction::SetError(error) => self.error = error,
            ChatAction::UpdateConversationTitle {
                conversation_id,
                title,
            } => {
                if let Some(conv) = self
                    .conversations
                    .iter_mut()
                    .find(|c| c.id == conversation_id)
                {
                    conv.title = title;
                }
            }

            ChatAction::FetchConversationsStart => {
                self.loading_conversations = true;
                self.error = None;
            }
            ChatAction::FetchConversationsSuccess(conversations) => {
                self.loading_conversations = false;
                if self.selected_id.is_none() {
                    self.selected_id = conversations.first().map(|c| c.id);
                }
                self.conversations = conversations;
            }
            ChatAction::FetchConversationsFailure(error) => {
                self.loading_conversations = false;
                self.error = Some(error);
            }

            ChatAction::FetchConversationsCancelled => self.loading_conversations = false,

            ChatAction::FetchHistoryStart => {
                self.loading_history = true;
                self.error = None;
            }
            ChatAction::FetchHistorySuccess {
                conversation_id,
                messages,
            } => {
                self.loading_history = false;
                self.messages_by_conv.insert(conversation_id, messages);
            }
            ChatAction::FetchHistoryFailure(error) => {
                self.loading_history = false;
                self.error = Some(error);
            }

            ChatAction::FetchHistoryCancelled => self.loading_history = false,

            ChatAction::CreateConversationSuccess(conversation) => {
                let id = conversation.id;
                self.conversations.insert(0, conversation);
                self.selected_id = Some(id);
                self.messages_by_conv.insert(id, Vec::new());
            }
            ChatAction::CreateConversationFailure(error) => {
                self.error = Some(error);
            }

            ChatAction::SendMessageStart => {
                self.sending = true;
                self.error = None;
            }
            ChatAction::SendMessageSuccess {
                conversation_id,
                assistant,
            } => {
                self.sending = false;
                self.messages_by_conv
                    .entry(conversation_id)
                    .or_default()
                    .push(assistant);
            }
            ChatAction::SendMessageFailure(error) => {
                self.sending = false;
                self.error = Some(error);
            }
            ChatAction::SendMessageCancelled => self.sending = false,
        }
    }

    /// Messages of the selected conversation (empty when nothing is selected)
    pub fn selected_messages(&self) -> &[ChatMessage] {
        self.selected_id
            .and_then(|id| self.messages_by_conv.get(&id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn messages_for(&self, conversation_id: i64) -> &[ChatMessage] {
        self.messages_by_conv
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn conversation(&self, conversation_id: i64) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }
}
