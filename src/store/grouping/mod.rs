//! Temporal grouping of conversations for display.

pub mod month_names;
pub mod temporal_grouper;

pub use month_names::{FALLBACK_LOCALE, month_name, resolve_locale};
pub use temporal_grouper::{ConversationGroup, GroupKind, group_conversations};
