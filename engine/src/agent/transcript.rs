//! Conversation transcript
//!
//! An ordered list of messages, append-only except for the trailing pending
//! placeholder. The placeholder marks a turn whose reply has been requested
//! but has not arrived; it is never sent to the completion service.

use sdk::types::{ChatMessage, Role};
use std::fmt;

/// Content of a transcript entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    /// Reply requested, not yet arrived
    Pending,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Content,
}

impl Message {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(content.into()),
        }
    }

    pub fn pending() -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.content, Content::Pending)
    }

    /// Text of a resolved message, `None` for the placeholder
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            Content::Text(text) => Some(text),
            Content::Pending => None,
        }
    }

    /// Wire form, `None` for the placeholder
    pub fn to_chat(&self) -> Option<ChatMessage> {
        self.as_text().map(|text| ChatMessage {
            role: self.role,
            content: text.to_string(),
        })
    }
}

impl From<ChatMessage> for Message {
    fn from(message: ChatMessage) -> Self {
        Self::text(message.role, message.content)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            Content::Text(text) => write!(f, "{}: {}", self.role, text),
            Content::Pending => write!(f, "{}: …", self.role),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript opening with the persona's greeting
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::text(Role::Assistant, greeting)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Append the pending placeholder
    pub fn push_pending(&mut self) {
        self.messages.push(Message::pending());
    }

    pub fn has_pending(&self) -> bool {
        self.messages.iter().any(Message::is_pending)
    }

    /// Replace the trailing placeholder with `message`.
    ///
    /// Appends instead when there is no trailing placeholder.
    pub fn resolve_pending(&mut self, message: Message) {
        match self.messages.last_mut() {
            Some(last) if last.is_pending() => *last = message,
            _ => self.messages.push(message),
        }
    }

    /// Drop the trailing placeholder, if any
    pub fn discard_pending(&mut self) {
        if self.messages.last().is_some_and(Message::is_pending) {
            self.messages.pop();
        }
    }

    /// Resolved messages in wire form, placeholder excluded
    pub fn to_chat(&self) -> Vec<ChatMessage> {
        self.messages.iter().filter_map(Message::to_chat).collect()
    }
}
