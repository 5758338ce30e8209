//! Session domain entities

use crate::tool::entities::ToolCall;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// A tool result message, answering a specific assistant tool call.
    Tool,
}

/// A message in a conversation (Entity)
///
/// Messages are immutable once appended to a [`Session`]. Assistant
/// messages may carry tool calls; `tool` messages reference the call they
/// answer via [`tool_call_id`](Self::tool_call_id) — consumers join results
/// to calls by identifier, never by position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Text content. May be empty when an assistant message only carries
    /// tool-call intents.
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by the model (assistant messages only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For `tool` messages: the id of the ToolCall this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// An assistant message carrying tool-call intents.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// A tool result message answering the call with the given id.
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// True if this assistant message still carries tool-call intents.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A client-scoped, persisted conversation history with expiry (Entity)
///
/// Owned exclusively by the session manager; mutated only by appending
/// messages or trimming the oldest. Messages are never reordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    id: String,
    messages: Vec<Message>,
    created_at: DateTime<Utc>,
    last_active: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            messages: Vec::new(),
            created_at: now,
            last_active: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        self.last_active
    }

    /// Append a message and refresh the activity timestamp.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
        self.last_active = Utc::now();
    }

    /// Refresh the activity timestamp without mutating history.
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Whether the session has outlived the given expiry duration.
    pub fn is_expired(&self, expiry: Duration) -> bool {
        Utc::now() - self.last_active > expiry
    }

    /// Replace the full history after a merge or trim. Relative order of
    /// retained messages must be preserved.
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "hello");
        assert!(!msg.has_tool_calls());

        let tool_msg = Message::tool("call_1", "result text");
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_assistant_with_tool_calls() {
        let call = ToolCall::new("read_file").with_arg("filepath", "a.txt");
        let msg = Message::assistant_with_tool_calls("", vec![call]);
        assert!(msg.has_tool_calls());
        assert!(msg.content.is_empty());
    }

    #[test]
    fn test_session_append_preserves_order() {
        let mut session = Session::new("sess-1");
        session.append(Message::system("be helpful"));
        session.append(Message::user("hi"));
        session.append(Message::assistant("hello"));

        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[test]
    fn test_session_expiry() {
        let session = Session::new("sess-1");
        assert!(!session.is_expired(Duration::seconds(3600)));
        assert!(session.is_expired(Duration::seconds(-1)));
    }

    #[test]
    fn test_message_roundtrip_serde() {
        let call = ToolCall::new("list_files").with_arg("directory", ".");
        let msg = Message::assistant_with_tool_calls("checking", vec![call]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].name, "list_files");
    }
}
