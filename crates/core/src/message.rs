//! Conversation message types.
//!
//! History flows in from the prompt assembler, is scored and possibly
//! summarized by the compression loop, and is finally normalized into a
//! strictly alternating sequence before it is sent to the model.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (or the worker speaking on the user's behalf)
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
}

impl Role {
    /// The conversational counterpart of this role. System has none and maps to itself.
    pub fn opposite(self) -> Self {
        match self {
            Role::User => Role::Assistant,
            Role::Assistant => Role::User,
            Role::System => Role::System,
        }
    }
}

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable id when the message is backed by a stored record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            role,
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
