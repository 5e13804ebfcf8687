//! Error types for the conversation store.

use std::fmt;

use thiserror::Error;

use crate::store::core::ids::{ConversationId, MessageId};

/// User-facing action that is refused while a response is being generated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GuardedAction {
    /// Renaming the conversation.
    Rename,
    /// Deleting the conversation.
    Delete,
    /// Exporting the conversation as a document.
    Export,
}

impl GuardedAction {
    /// Stable string form used in logs and API payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rename => "rename",
            Self::Delete => "delete",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for GuardedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse error taxonomy callers can branch on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Referenced conversation or message does not exist.
    NotFound,
    /// Argument rejected before any write (e.g. empty rename target).
    InvalidArgument,
    /// Malformed import document.
    InvalidFormat,
    /// Underlying durable medium is inaccessible.
    StorageUnavailable,
    /// Action refused because the conversation is generating a response.
    GenerationInProgress,
    /// Invalid configuration values.
    Configuration,
}

impl ErrorKind {
    /// Stable `snake_case` name used in API payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::InvalidFormat => "invalid_format",
            Self::StorageUnavailable => "storage_unavailable",
            Self::GenerationInProgress => "generation_in_progress",
            Self::Configuration => "configuration",
        }
    }
}

/// Conversation store error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Conversation id is absent or was deleted.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),
    /// Message id is absent from an existing conversation.
    #[error("message {message} not found in conversation {conversation}")]
    MessageNotFound {
        /// Conversation that was searched.
        conversation: ConversationId,
        /// Missing message id.
        message: MessageId,
    },
    /// Rejected argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Import document does not have the expected shape.
    #[error("invalid document format: {0}")]
    InvalidFormat(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("storage unavailable: {0}")]
    Storage(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Caller-side refusal while a response streams into the conversation.
    #[error("cannot {action} conversation {conversation} while a response is being generated")]
    GenerationInProgress {
        /// Conversation currently generating.
        conversation: ConversationId,
        /// Refused action.
        action: GuardedAction,
    },
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ChatError {
    /// Map this error onto the coarse taxonomy.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ConversationNotFound(_) | Self::MessageNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvalidFormat(_) => ErrorKind::InvalidFormat,
            Self::Sqlite(_) | Self::Storage(_) | Self::Serialization(_) => {
                ErrorKind::StorageUnavailable
            }
            Self::GenerationInProgress { .. } => ErrorKind::GenerationInProgress,
            Self::InvalidConfig(_) => ErrorKind::Configuration,
        }
    }
}

/// Convenience result alias for store operations.
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let id = ConversationId::new();
        assert_eq!(ChatError::ConversationNotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            ChatError::InvalidArgument("empty".to_string()).kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            ChatError::Sqlite(rusqlite::Error::QueryReturnedNoRows).kind(),
            ErrorKind::StorageUnavailable
        );
        assert_eq!(
            ChatError::GenerationInProgress {
                conversation: id,
                action: GuardedAction::Delete,
            }
            .kind(),
            ErrorKind::GenerationInProgress
        );
    }

    #[test]
    fn test_generation_message_names_action() {
        let id = ConversationId::new();
        let err = ChatError::GenerationInProgress {
            conversation: id,
            action: GuardedAction::Export,
        };
        assert!(err.to_string().starts_with("cannot export conversation"));
    }
}
