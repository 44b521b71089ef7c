//! Conversation state owned by the [`ConversationManager`](super::ConversationManager)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of most recent messages sent as prompt history and persisted
pub const HISTORY_WINDOW: usize = 10;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation
///
/// Role sequencing is not validated: two consecutive `user` messages are
/// perfectly legal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Free-form metadata attached to a conversation
pub type Metadata = Map<String, Value>;

/// Full mutable state of one agent session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    /// Chronological message history
    pub history: Vec<Message>,
    /// Auxiliary key/value context (working directory, shell, ...)
    pub metadata: Metadata,
}

impl ConversationContext {
    pub fn new(history: Vec<Message>, metadata: Metadata) -> Self {
        Self { history, metadata }
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty() && self.metadata.is_empty()
    }

    /// The slice of history that survives a persist
    pub fn window(&self) -> &[Message] {
        let start = self.history.len().saturating_sub(HISTORY_WINDOW);
        &self.history[start..]
    }
}

/// Shallow-merge `overrides` over `base`; the override wins key-for-key.
pub fn merge_metadata(base: &Metadata, overrides: &Metadata) -> Metadata {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
