//! Conversation store abstraction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::store::core::conversation::{Conversation, ConversationMeta};
use crate::store::core::errors::ChatResult;
use crate::store::core::ids::{ConversationId, MessageId};
use crate::store::core::message::Message;
use crate::store::notify::ChangeNotifier;
use crate::store::transfer::{ConversationDocument, parse_json};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable CRUD over conversations and their ordered messages.
///
/// Every successful mutation is committed atomically and then announced
/// through [`ConversationStore::notifier`]. Failed mutations leave prior state
/// untouched. The store never consults generation state: callers that act on
/// behalf of a user go through `ConversationActions`.
pub trait ConversationStore: Send + Sync {
    /// List every live conversation, newest `last_modified` first.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn get_all_conversations(&self) -> StoreFuture<'_, ChatResult<Vec<ConversationMeta>>>;

    /// Load a conversation with all its messages.
    ///
    /// # Errors
    /// Returns `ConversationNotFound` if the id is absent or deleted.
    fn get_conversation(&self, id: ConversationId) -> StoreFuture<'_, ChatResult<Conversation>>;

    /// Create an empty conversation with a freshly minted id.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create_conversation(&self, initial_name: &str)
    -> StoreFuture<'_, ChatResult<Conversation>>;

    /// Rename a conversation.
    ///
    /// # Errors
    /// Returns `InvalidArgument` for blank names, `ConversationNotFound` if absent.
    fn update_conversation_name(
        &self,
        id: ConversationId,
        new_name: &str,
    ) -> StoreFuture<'_, ChatResult<()>>;

    /// Append a message at the end of a conversation.
    ///
    /// # Errors
    /// Returns `ConversationNotFound` if absent, `InvalidArgument` if the
    /// message id is already used in this conversation.
    fn append_message(
        &self,
        id: ConversationId,
        message: Message,
    ) -> StoreFuture<'_, ChatResult<Message>>;

    /// Replace the content of one message.
    ///
    /// # Errors
    /// Returns `ConversationNotFound` or `MessageNotFound`.
    fn edit_message(
        &self,
        id: ConversationId,
        message_id: &MessageId,
        new_content: &str,
    ) -> StoreFuture<'_, ChatResult<()>>;

    /// Remove one message.
    ///
    /// # Errors
    /// Returns `ConversationNotFound` or `MessageNotFound`.
    fn delete_message(
        &self,
        id: ConversationId,
        message_id: &MessageId,
    ) -> StoreFuture<'_, ChatResult<()>>;

    /// Delete a conversation and all of its messages.
    ///
    /// Retrying on an already deleted id succeeds without notifying.
    ///
    /// # Errors
    /// Returns `ConversationNotFound` if the id never existed.
    fn delete_conversation(&self, id: ConversationId) -> StoreFuture<'_, ChatResult<()>>;

    /// Snapshot a conversation as a portable document.
    ///
    /// # Errors
    /// Returns `ConversationNotFound` if absent.
    fn export_conversation(
        &self,
        id: ConversationId,
    ) -> StoreFuture<'_, ChatResult<ConversationDocument>>;

    /// Validate a document and insert it as a new conversation with a new id.
    ///
    /// # Errors
    /// Returns `InvalidFormat` on a structural mismatch.
    fn import_conversation(&self, document: &Value) -> StoreFuture<'_, ChatResult<Conversation>>;

    /// Parse JSON text and import it.
    ///
    /// # Errors
    /// Returns `InvalidFormat` if the text is not JSON or has the wrong shape.
    fn import_conversation_json(&self, raw: &str) -> StoreFuture<'_, ChatResult<Conversation>> {
        let parsed = parse_json(raw);
        Box::pin(async move {
            let value = parsed?;
            self.import_conversation(&value).await
        })
    }

    /// Change notifier fed after every committed mutation.
    fn notifier(&self) -> &Arc<ChangeNotifier>;
}
