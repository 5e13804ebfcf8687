//! Durable conversation storage.

pub mod conversation_store;
pub mod sqlite_store;

pub use conversation_store::{ConversationStore, StoreFuture};
pub use sqlite_store::{Clock, SCHEMA_VERSION, SqliteConversationStore};
