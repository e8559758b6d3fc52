//! Message and Conversation domain types.
//!
//! These are the value objects that flow through the whole system:
//! the caller sends a transcript → the agent loop extends it → the gateway
//! returns (or streams) the extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a conversation (one chat request).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The language model
    Assistant,
    /// System instructions (persona, rules)
    System,
    /// Tool execution result
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// Create an assistant message that requests tool calls.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<MessageToolCall>) -> Self {
        let mut message = Self::with_role(Role::Assistant, content.into());
        message.tool_calls = tool_calls;
        message
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut message = Self::with_role(Role::Tool, content.into());
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Whether this is an assistant message asking for at least one tool.
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Opaque ID, used only to correlate the result
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Structured arguments
    pub arguments: serde_json::Value,
}

impl MessageToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a call from the raw argument text a provider sends.
    ///
    /// Unparseable text is kept as a JSON string so schema validation can
    /// report it back to the model.
    pub fn from_raw_arguments(id: impl Into<String>, name: impl Into<String>, raw: &str) -> Self {
        let arguments = if raw.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
        };
        Self::new(id, name, arguments)
    }
}

/// A broken link between a tool result and the request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("tool message at index {index} has no tool_call_id")]
    MissingToolCallId { index: usize },

    #[error("tool message at index {index} does not follow an assistant tool request")]
    OrphanToolResult { index: usize },

    #[error("tool message at index {index} answers unknown or already answered call '{id}'")]
    UnknownToolCallId { index: usize, id: String },
}

/// An ordered, append-only sequence of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Ordered messages
    pub messages: Vec<Message>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Seed a conversation from caller-supplied messages, keeping their order.
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut conversation = Self::new();
        for message in messages {
            conversation.push(message);
        }
        conversation
    }

    /// Append a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recently appended message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Verify that every tool message answers a call of the nearest
    /// preceding assistant message, with nothing else in between.
    pub fn check_tool_links(&self) -> Result<(), TranscriptError> {
        let mut pending: HashSet<&str> = HashSet::new();

        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Assistant => {
                    pending = message.tool_calls.iter().map(|tc| tc.id.as_str()).collect();
                }
                Role::Tool => {
                    let id = message
                        .tool_call_id
                        .as_deref()
                        .ok_or(TranscriptError::MissingToolCallId { index })?;
                    if pending.is_empty() {
                        return Err(TranscriptError::OrphanToolResult { index });
                    }
                    if !pending.remove(id) {
                        return Err(TranscriptError::UnknownToolCallId {
                            index,
                            id: id.to_string(),
                        });
                    }
                }
                Role::User | Role::System => pending.clear(),
            }
        }

        Ok(())
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
