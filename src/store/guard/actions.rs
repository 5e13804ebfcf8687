//! User-facing conversation actions.
//!
//! The store trusts its callers. This layer is the caller that refuses to
//! rename, delete or export a conversation while a response is streaming
//! into it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::store::core::conversation::Conversation;
use crate::store::core::errors::{ChatError, ChatResult, GuardedAction};
use crate::store::core::ids::ConversationId;
use crate::store::core::message::Message;
use crate::store::guard::generation_guard::GenerationGuard;
use crate::store::storage::ConversationStore;
use crate::store::transfer::ConversationDocument;

/// Characters of the first message used as a new conversation's name.
pub const TITLE_MAX_CHARS: usize = 256;

/// Name used when the first message has no visible text.
pub const UNTITLED_CONVERSATION: &str = "New conversation";

/// Store access gated by generation state.
#[derive(Clone)]
pub struct ConversationActions {
    store: Arc<dyn ConversationStore>,
    guard: Arc<dyn GenerationGuard>,
}

impl ConversationActions {
    /// Wrap a store and the guard consulted before destructive actions.
    #[must_use]
    pub fn new(store: Arc<dyn ConversationStore>, guard: Arc<dyn GenerationGuard>) -> Self {
        Self { store, guard }
    }

    /// Underlying store, for unguarded operations.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Rename unless a generation is running.
    ///
    /// # Errors
    /// Returns `GenerationInProgress`, or any store error.
    pub async fn rename(&self, id: ConversationId, new_name: &str) -> ChatResult<()> {
        self.ensure_idle(id, GuardedAction::Rename)?;
        self.store.update_conversation_name(id, new_name).await
    }

    /// Delete unless a generation is running.
    ///
    /// # Errors
    /// Returns `GenerationInProgress`, or any store error.
    pub async fn delete(&self, id: ConversationId) -> ChatResult<()> {
        self.ensure_idle(id, GuardedAction::Delete)?;
        self.store.delete_conversation(id).await
    }

    /// Export unless a generation is running.
    ///
    /// # Errors
    /// Returns `GenerationInProgress`, or any store error.
    pub async fn export(&self, id: ConversationId) -> ChatResult<ConversationDocument> {
        self.ensure_idle(id, GuardedAction::Export)?;
        self.store.export_conversation(id).await
    }

    /// Create a conversation from the first message a user sends.
    ///
    /// # Errors
    /// Returns any store error.
    pub async fn start_conversation(&self, first_message: Message) -> ChatResult<Conversation> {
        self.create_with_first_message(None, first_message).await
    }

    /// Create a conversation and append its first message.
    ///
    /// Without `name` the conversation is titled after the message. Creation
    /// and append are separate commits: if the append fails, the conversation
    /// is deleted again, so observers see it appear and then disappear.
    ///
    /// # Errors
    /// Returns the store error that stopped creation or the append.
    pub async fn create_with_first_message(
        &self,
        name: Option<&str>,
        first_message: Message,
    ) -> ChatResult<Conversation> {
        let name = name.map_or_else(|| conversation_title(&first_message.content), str::to_string);
        let created = self.store.create_conversation(&name).await?;

        if let Err(err) = self.store.append_message(created.id, first_message).await {
            warn!(conversation_id = %created.id, error = %err, "First message failed, removing conversation");
            if let Err(cleanup) = self.store.delete_conversation(created.id).await {
                warn!(conversation_id = %created.id, error = %cleanup, "Could not remove conversation");
            }
            return Err(err);
        }

        info!(conversation_id = %created.id, "Started conversation from first message");
        self.store.get_conversation(created.id).await
    }

    fn ensure_idle(&self, id: ConversationId, action: GuardedAction) -> ChatResult<()> {
        if self.guard.is_generating(id) {
            warn!(conversation_id = %id, action = %action, "Refused while generating");
            return Err(ChatError::GenerationInProgress {
                conversation: id,
                action,
            });
        }
        Ok(())
    }
}

/// Leading characters of a message, used as a default conversation name.
#[must_use]
pub fn conversation_title(content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return UNTITLED_CONVERSATION.to_string();
    }
    trimmed.chars().take(TITLE_MAX_CHARS).collect()
}
