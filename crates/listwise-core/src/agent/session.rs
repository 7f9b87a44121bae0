//! In-process chat session for hosts that keep the history themselves (the
//! CLI). The HTTP surface is stateless and the client holds the history.

use std::mem;

use uuid::Uuid;

use super::loop_events::TurnResponse;
use super::manager::ChatMessage;
use crate::ai::types::Role;
use crate::storage::{ArchivedMessage, ConversationArchive};
use crate::types::AgentContext;

pub struct ChatSession {
    pub id: String,
    pub context: AgentContext,
    history: Vec<ChatMessage>,
    archive: ConversationArchive,
}

impl ChatSession {
    pub fn new(context: AgentContext, archive: ConversationArchive) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            context,
            history: Vec::new(),
            archive,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.history.push(ChatMessage::user(text));
    }

    pub fn push_response(&mut self, response: &TurnResponse) {
        self.history.push(ChatMessage::assistant(response));
    }

    /// Drop the last user message, used when its turn failed.
    pub fn pop_user(&mut self) -> Option<ChatMessage> {
        match self.history.last() {
            Some(m) if m.role == Role::User => self.history.pop(),
            _ => None,
        }
    }

    /// Clear the history immediately and archive the old one in the
    /// background. Returns the archive id, or `None` for an empty session.
    pub fn reset(&mut self) -> Option<String> {
        let history = mem::take(&mut self.history);
        self.id = Uuid::new_v4().to_string();
        archive_in_background(&self.archive, &self.context, history)
    }
}

/// Archive a conversation without blocking the caller. Archival failures are
/// logged and never reach the user.
pub fn archive_in_background(
    archive: &ConversationArchive,
    context: &AgentContext,
    history: Vec<ChatMessage>,
) -> Option<String> {
    if history.is_empty() {
        return None;
    }
    let archive_id = Uuid::new_v4().to_string();
    let messages: Vec<ArchivedMessage> = history
        .into_iter()
        .map(|m| ArchivedMessage {
            role: match m.role {
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: m.content,
        })
        .collect();

    let archive = archive.clone();
    let scope = context.scope();
    let id = archive_id.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(e) = archive.archive(&id, &scope, &messages) {
            tracing::warn!(archive_id = %id, error = %e, "Failed to archive conversation");
        }
    });
    Some(archive_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, Stores};
    use std::time::Duration;

    #[tokio::test]
    async fn test_reset_clears_then_archives() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let mut session = ChatSession::new(AgentContext::new("m1", "s1"), stores.conversations.clone());
        session.push_user("hello");
        session.history.push(ChatMessage {
            role: Role::Assistant,
            content: "hi there".into(),
            tool_invocations: Vec::new(),
            confirmation: None,
        });

        let old_id = session.id.clone();
        let archive_id = session.reset().unwrap();
        assert!(session.history().is_empty());
        assert_ne!(session.id, old_id);

        let mut archived = None;
        for _ in 0..50 {
            archived = stores.conversations.load(&archive_id).unwrap();
            if archived.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let archived = archived.unwrap();
        assert_eq!(archived.len(), 2);
        assert_eq!(archived[1].role, "assistant");
    }

    #[tokio::test]
    async fn test_empty_reset_archives_nothing() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let mut session = ChatSession::new(AgentContext::new("m1", "s1"), stores.conversations);
        assert!(session.reset().is_none());
    }

    #[test]
    fn test_pop_user_only_removes_user_messages() {
        let stores = Stores::new(Database::in_memory().unwrap());
        let mut session = ChatSession::new(AgentContext::new("m1", "s1"), stores.conversations);
        assert!(session.pop_user().is_none());
        session.push_user("hello");
        assert_eq!(session.pop_user().unwrap().content, "hello");
    }
}
