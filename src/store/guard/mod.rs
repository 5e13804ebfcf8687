//! Generation guard contract and the actions that honour it.

pub mod actions;
pub mod generation_guard;

pub use actions::{ConversationActions, conversation_title};
pub use generation_guard::{GenerationGuard, GenerationTicket, GenerationTracker};
