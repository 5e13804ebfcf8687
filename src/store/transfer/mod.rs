//! Export/import document format.

pub mod document;

pub use document::{ConversationDocument, parse_json};
