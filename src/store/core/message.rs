//! Message model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::store::core::ids::MessageId;

/// A single message inside a conversation.
///
/// Provider and timing metadata are opaque to the store: whatever lands in
/// `extra` is persisted and exported verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier, unique within the owning conversation.
    pub id: MessageId,
    /// Author role (`user`, `assistant`, `system`, ...).
    pub role: String,
    /// Message body.
    pub content: String,
    /// Opaque pass-through fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Build a message with a fresh id and no extra metadata.
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }

    /// Build a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Build an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }

    /// Attach one opaque metadata field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Replace the generated id.
    #[must_use]
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }
}
