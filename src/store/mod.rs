//! Local-first conversation store for the chat client.
//!
//! This module is organized into:
//! - `core`: Configuration, errors, IDs, conversations and messages
//! - `storage`: The `ConversationStore` trait and its `SQLite` backend
//! - `notify`: Post-commit change notification
//! - `transfer`: Portable export/import documents
//! - `grouping`: Date buckets for the conversation list
//! - `guard`: Generation guard contract and guarded user actions

pub mod core;
pub mod grouping;
pub mod guard;
pub mod notify;
pub mod storage;
pub mod transfer;

// Re-export commonly used types for convenience
pub use core::{
    ChatConfig, ChatError, ChatResult, Conversation, ConversationId, ConversationMeta, ErrorKind,
    GuardedAction, LastModified, Message, MessageId, MessageIdError, ServerConfig, StorageConfig,
};
pub use grouping::{ConversationGroup, GroupKind, group_conversations, resolve_locale};
pub use guard::{ConversationActions, GenerationGuard, GenerationTicket, GenerationTracker};
pub use notify::{ChangeNotifier, SubscriptionToken};
pub use storage::{ConversationStore, SqliteConversationStore, StoreFuture};
pub use transfer::ConversationDocument;
