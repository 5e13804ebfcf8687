//! Conversation snapshots handed out by the store.

use serde::{Deserialize, Serialize};

use crate::store::core::ids::ConversationId;
use crate::store::core::message::Message;

/// Anything that carries a last-modified timestamp (epoch milliseconds).
pub trait LastModified {
    /// Most recent committed write, in milliseconds since the Unix epoch.
    fn last_modified(&self) -> i64;
}

/// Full conversation snapshot, including messages (oldest first).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier.
    pub id: ConversationId,
    /// Display name.
    pub name: String,
    /// Last write timestamp in milliseconds since Unix epoch.
    pub last_modified: i64,
    /// Ordered messages.
    pub messages: Vec<Message>,
}

impl LastModified for Conversation {
    fn last_modified(&self) -> i64 {
        self.last_modified
    }
}

/// Conversation metadata without message bodies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMeta {
    /// Unique identifier.
    pub id: ConversationId,
    /// Display name.
    pub name: String,
    /// Last write timestamp in milliseconds since Unix epoch.
    pub last_modified: i64,
    /// Number of messages in the conversation.
    pub message_count: u32,
}

impl LastModified for ConversationMeta {
    fn last_modified(&self) -> i64 {
        self.last_modified
    }
}

impl<T: LastModified> LastModified for &T {
    fn last_modified(&self) -> i64 {
        (**self).last_modified()
    }
}
