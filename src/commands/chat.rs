//! Chat commands and the interactive chat loop

use crate::chat::{ChatSession, Entered};
use crate::error::{Error, Result};
use crate::models::{ChatMessage, Conversation, Role};
use crate::navigation::Navigation;
use crate::progress::with_spinner;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

pub async fn cmd_chat_list(session: &ChatSession) -> Result<Vec<Conversation>> {
    session.service().fetch_conversations().await
}

pub async fn cmd_chat_new(session: &ChatSession) -> Result<Conversation> {
    session.new_conversation().await
}

/// Full history of a conversation
pub async fn cmd_chat_history(session: &ChatSession, conversation_id: i64) -> Result<Vec<ChatMessage>> {
    session.select(conversation_id).await?;
    Ok(session
        .service()
        .store()
        .with(|s| s.messages_for(conversation_id).to_vec()))
}

/// Ask one question in a conversation and return the answer
pub async fn cmd_chat_ask(
    session: &ChatSession,
    conversation_id: i64,
    question: &str,
) -> Result<ChatMessage> {
    if question.trim().is_empty() {
        return Err(Error::Validation("The question cannot be empty".to_string()));
    }
    session.select(conversation_id).await?;
    session
        .submit(question)
        .await?
        .ok_or_else(|| Error::Validation("The question was not sent".to_string()))
}

pub async fn cmd_chat_rename(session: &ChatSession, conversation_id: i64, title: &str) -> Result<()> {
    session.rename(conversation_id, title).await
}

/// Delete a conversation and return what is left
pub async fn cmd_chat_delete(session: &ChatSession, conversation_id: i64) -> Result<Vec<Conversation>> {
    session.delete_and_refresh(conversation_id).await?;
    Ok(session.service().store().with(|s| s.conversations.clone()))
}

/// One line typed into the chat loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Empty,
    Message(String),
    New,
    List,
    Switch(i64),
    Rename(String),
    Delete,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_repl_line(line: &str) -> ReplInput {
    let line = line.trim();
    if line.is_empty() {
        return ReplInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplInput::Message(line.to_string());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "new" => ReplInput::New,
        "list" | "ls" => ReplInput::List,
        "switch" | "open" => rest
            .parse()
            .map(ReplInput::Switch)
            .unwrap_or_else(|_| ReplInput::Unknown(line.to_string())),
        "rename" => ReplInput::Rename(rest.to_string()),
        "delete" => ReplInput::Delete,
        "help" | "?" => ReplInput::Help,
        "quit" | "exit" | "q" => ReplInput::Quit,
        _ => ReplInput::Unknown(line.to_string()),
    }
}

/// Run the interactive chat over `input` until it ends, `/quit` is typed,
/// or the session is cancelled.
///
/// A file opened from the explorer is handed over through `navigation` and
/// starts a conversation about it before the first prompt.
pub async fn cmd_chat_repl<R>(
    session: &ChatSession,
    navigation: &mut Navigation,
    input: R,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let message = if navigation.is_pending() {
        "Opening file"
    } else {
        "Loading conversations"
    };
    let entered = with_spinner(message, session.enter(navigation)).await?;
    print_entered(session, &entered);
    print_repl_help();

    let cancel = session.service().cancel_token().clone();
    let mut lines = input.lines();
    loop {
        print_prompt(session);
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };

        match handle_repl_input(session, parse_repl_line(&line)).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(Error::Cancelled) => break,
            Err(e) => {
                warn!("{}", e);
                println!("✗ {}", e);
            }
        }
    }
    println!();
    Ok(())
}

/// Returns false when the loop should stop
async fn handle_repl_input(session: &ChatSession, input: ReplInput) -> Result<bool> {
    let selected = || session.service().store().with(|s| s.selected_id);
    match input {
        ReplInput::Empty => {}
        ReplInput::Message(text) => {
            if selected().is_none() {
                println!("No conversation selected. Type /new to start one.");
                return Ok(true);
            }
            match with_spinner("Thinking", session.submit(&text)).await? {
                Some(answer) => print_answer(&answer),
                None => debug!("Input not sent"),
            }
        }
        ReplInput::New => {
            let conversation = session.new_conversation().await?;
            println!("✓ Started \"{}\" (#{})", conversation.title, conversation.id);
        }
        ReplInput::List => {
            let conversations = session.service().fetch_conversations().await?;
            print_conversations(&conversations, selected());
        }
        ReplInput::Switch(id) => {
            with_spinner("Loading history", session.select(id)).await?;
            print_history(&session.service().store().with(|s| s.messages_for(id).to_vec()));
        }
        ReplInput::Rename(title) => match selected() {
            Some(id) => {
                session.rename(id, &title).await?;
                println!("✓ Renamed to \"{}\"", title.trim());
            }
            None => println!("No conversation selected."),
        },
        ReplInput::Delete => match selected() {
            Some(id) => {
                session.delete_and_refresh(id).await?;
                println!("✓ Deleted conversation #{}", id);
                print_conversations(
                    &session.service().store().with(|s| s.conversations.clone()),
                    selected(),
                );
            }
            None => println!("No conversation selected."),
        },
        ReplInput::Help => print_repl_help(),
        ReplInput::Quit => return Ok(false),
        ReplInput::Unknown(line) => println!("Unknown command: {} (type /help)", line),
    }
    Ok(true)
}

fn print_prompt(session: &ChatSession) {
    let title = session.service().store().with(|s| {
        s.selected_id
            .and_then(|id| s.conversation(id))
            .map(|c| c.title.clone())
    });
    match title {
        Some(title) => print!("{} › ", title),
        None => print!("› "),
    }
    let _ = std::io::stdout().flush();
}

fn print_repl_help() {
    println!("Type a message to chat. Commands:");
    println!("  /new              start a new conversation");
    println!("  /list             list conversations");
    println!("  /switch <id>      switch to a conversation");
    println!("  /rename <title>   rename the current conversation");
    println!("  /delete           delete the current conversation");
    println!("  /quit             leave\n");
}

pub fn print_entered(session: &ChatSession, entered: &Entered) {
    match entered {
        Entered::Empty => {
            println!("\n💬 No conversations yet. Type /new to start one.\n");
        }
        Entered::Resumed(id) => {
            let state = session.service().store().snapshot();
            let title = state
                .conversation(*id)
                .map(|c| c.title.as_str())
                .unwrap_or("conversation");
            println!("\n💬 {} (#{})\n", title, id);
            print_history(state.messages_for(*id));
        }
        Entered::FileChat {
            conversation,
            answer,
        } => {
            println!("\n💬 {} (#{})\n", conversation.title, conversation.id);
            let question: Vec<ChatMessage> = session.service().store().with(|s| {
                s.messages_for(conversation.id)
                    .iter()
                    .filter(|m| m.id != answer.id)
                    .cloned()
                    .collect()
            });
            print_history(&question);
            print_answer(answer);
        }
    }
}

pub fn print_conversations(conversations: &[Conversation], selected: Option<i64>) {
    println!("\n💬 Conversations\n");

    if conversations.is_empty() {
        println!("No conversations yet. Use 'ragdesk chat new' to start one.");
        return;
    }

    for conversation in conversations {
        let marker = if Some(conversation.id) == selected { "▸" } else { "•" };
        println!(
            "{} #{} {} ({})",
            marker,
            conversation.id,
            conversation.title,
            short_time(&conversation.created_at)
        );
    }
}

pub fn print_history(messages: &[ChatMessage]) {
    if messages.is_empty() {
        println!("(no messages)\n");
        return;
    }
    for message in messages {
        print_message(message);
    }
}

pub fn print_answer(message: &ChatMessage) {
    print_message(message);
}

fn print_message(message: &ChatMessage) {
    let who = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    };
    println!("[{}] {}:", short_time(&message.timestamp), who);
    println!("{}\n", message.content);
}

/// `HH:MM` in local time for RFC 3339 timestamps, the raw text otherwise
fn short_time(timestamp: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .map(|t| {
            t.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M")
                .to_string()
        })
        .unwrap_or_else(|_| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::client_for;
    use crate::chat::{ChatService, ChatStore};
    use crate::config::ChatConfig;
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
        ChatSession::new(
            service,
            ChatConfig {
                file_prompt_delay_ms: 0,
                ..ChatConfig::default()
            },
        )
    }

    async fn mount_list(server: &MockServer, conversations: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/api/AI/me/conversations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "conversations": conversations }
            })))
            .mount(server)
            .await;
    }

    #[test]
    fn test_parse_repl_line() {
        assert_eq!(parse_repl_line("   "), ReplInput::Empty);
        assert_eq!(
            parse_repl_line(" what is in q1? "),
            ReplInput::Message("what is in q1?".to_string())
        );
        assert_eq!(parse_repl_line("/new"), ReplInput::New);
        assert_eq!(parse_repl_line("/switch 12"), ReplInput::Switch(12));
        assert_eq!(
            parse_repl_line("/switch abc"),
            ReplInput::Unknown("/switch abc".to_string())
        );
        assert_eq!(
            parse_repl_line("/rename  Budget review "),
            ReplInput::Rename("Budget review".to_string())
        );
        assert_eq!(parse_repl_line("/exit"), ReplInput::Quit);
        assert_eq!(parse_repl_line("/nope"), ReplInput::Unknown("/nope".to_string()));
    }

    #[test]
    fn test_short_time_keeps_unparseable_text() {
        assert_eq!(short_time("yesterday"), "yesterday");
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_question() {
        let server = MockServer::start().await;
        let session = session_for(&server);
        assert!(matches!(
            cmd_chat_ask(&session, 1, "  ").await,
            Err(Error::Validation(_))
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repl_sends_messages_until_quit() {
        let server = MockServer::start().await;
        mount_list(
            &server,
            json!([{ "id": 3, "title": "Budget", "createdAt": "2024-05-01T10:00:00Z" }]),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/api/AI/conversation/3/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "messages": [] }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/AI/ask"))
            .and(body_json(json!({ "conversationId": 3, "question": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "response": "hi there", "timestamp": "2024-05-01T10:01:00Z" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server);
        let mut navigation = Navigation::new();
        cmd_chat_repl(&session, &mut navigation, &b"hello\n/quit\nignored\n"[..])
            .await
            .unwrap();

        let messages = session.service().store().with(|s| s.messages_for(3).to_vec());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "hi there");
    }
}
