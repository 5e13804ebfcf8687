//! Generation state consulted before destructive conversation actions.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::store::core::ids::ConversationId;

/// Answers whether a response is currently streaming into a conversation.
///
/// Implementations must be synchronous and free of side effects.
pub trait GenerationGuard: Send + Sync {
    /// `true` while a response is being generated for `id`.
    fn is_generating(&self, id: ConversationId) -> bool;
}

/// In-process generation registry.
///
/// Overlapping generations on the same conversation are counted; the
/// conversation stays busy until every ticket is dropped.
#[derive(Clone, Debug, Default)]
pub struct GenerationTracker {
    active: Arc<DashMap<ConversationId, usize>>,
}

impl GenerationTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as generating until the returned ticket is dropped.
    #[must_use = "the conversation is released as soon as the ticket is dropped"]
    pub fn begin(&self, id: ConversationId) -> GenerationTicket {
        *self.active.entry(id).or_insert(0) += 1;
        debug!(conversation_id = %id, "Generation started");
        GenerationTicket {
            active: Arc::clone(&self.active),
            id,
        }
    }

    /// Number of conversations currently generating.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

impl GenerationGuard for GenerationTracker {
    fn is_generating(&self, id: ConversationId) -> bool {
        self.active.contains_key(&id)
    }
}

/// RAII marker for one in-flight generation.
#[derive(Debug)]
pub struct GenerationTicket {
    active: Arc<DashMap<ConversationId, usize>>,
    id: ConversationId,
}

impl GenerationTicket {
    /// Conversation this ticket keeps busy.
    #[must_use]
    pub const fn conversation_id(&self) -> ConversationId {
        self.id
    }
}

impl Drop for GenerationTicket {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.active.entry(self.id) {
            if *entry.get() <= 1 {
                entry.remove();
                debug!(conversation_id = %self.id, "Generation finished");
            } else {
                *entry.get_mut() -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_drop_clears_flag() {
        let tracker = GenerationTracker::new();
        let id = ConversationId::new();
        assert!(!tracker.is_generating(id));

        let ticket = tracker.begin(id);
        assert!(tracker.is_generating(id));
        assert_eq!(ticket.conversation_id(), id);

        drop(ticket);
        assert!(!tracker.is_generating(id));
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_overlapping_generations_are_counted() {
        let tracker = GenerationTracker::new();
        let id = ConversationId::new();
        let other = ConversationId::new();

        let first = tracker.begin(id);
        let second = tracker.begin(id);
        assert!(!tracker.is_generating(other));

        drop(first);
        assert!(tracker.is_generating(id));
        drop(second);
        assert!(!tracker.is_generating(id));
    }

    #[test]
    fn test_clones_share_state() {
        let tracker = GenerationTracker::new();
        let shared: Arc<dyn GenerationGuard> = Arc::new(tracker.clone());
        let id = ConversationId::new();

        let _ticket = tracker.begin(id);
        assert!(shared.is_generating(id));
    }
}
