//! Owner partitions and chat wire messages

use serde::{Deserialize, Serialize};
use std::fmt;

/// The axis along which memories are segregated.
///
/// Every memory belongs to exactly one partition. The partition decides which
/// identifier field (`user_id` or `agent_id`) is sent to the memory service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    /// Memories about the end-user
    User,

    /// Memories of the synthetic agent persona
    Agent,
}

impl OwnerKind {
    /// Name of the identifier field the memory service expects for this partition
    pub fn id_field(&self) -> &'static str {
        match self {
            OwnerKind::User => "user_id",
            OwnerKind::Agent => "agent_id",
        }
    }

    /// Resolve the partition from a pair of optional identifiers.
    ///
    /// `agent_id` wins when both are present. Empty strings count as absent.
    pub fn from_ids<'a>(
        user_id: Option<&'a str>,
        agent_id: Option<&'a str>,
    ) -> Option<(OwnerKind, &'a str)> {
        match (
            user_id.filter(|s| !s.is_empty()),
            agent_id.filter(|s| !s.is_empty()),
        ) {
            (_, Some(agent)) => Some((OwnerKind::Agent, agent)),
            (Some(user), None) => Some((OwnerKind::User, user)),
            (None, None) => None,
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerKind::User => write!(f, "user"),
            OwnerKind::Agent => write!(f, "agent"),
        }
    }
}

/// Role of a chat message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End-user message
    User,

    /// Assistant (persona) message
    Assistant,

    /// System instruction
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

/// A `{role, content}` pair as exchanged with the completion and memory services
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Same content, different role
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}
