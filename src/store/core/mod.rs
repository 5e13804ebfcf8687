//! Core store types and identifiers.

pub mod config;
pub mod conversation;
pub mod errors;
pub mod ids;
pub mod message;

pub use config::{ChatConfig, ServerConfig, StorageConfig};
pub use conversation::{Conversation, ConversationMeta, LastModified};
pub use errors::{ChatError, ChatResult, ErrorKind, GuardedAction};
pub use ids::{ConversationId, MessageId, MessageIdError};
pub use message::Message;
