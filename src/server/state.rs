//! Application state shared across all request handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use crate::store::{
    ChatConfig, ChatResult, ConversationActions, ConversationStore, GenerationTracker,
    ServerConfig, SqliteConversationStore, SubscriptionToken,
};

/// Buffered change events per SSE client before it is considered lagging.
const EVENT_CAPACITY: usize = 64;

/// Shared application state.
pub struct AppState {
    /// Conversation store.
    pub store: Arc<dyn ConversationStore>,
    /// Guarded rename/delete/export.
    pub actions: ConversationActions,
    /// Generation registry consulted by `actions`.
    pub generations: GenerationTracker,
    /// Change events fanned out to SSE clients.
    pub events: broadcast::Sender<u64>,
    /// Locale for month buckets when a request names none.
    pub default_locale: String,
    subscription: SubscriptionToken,
}

impl AppState {
    /// Open the configured database and build the state around it.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the store cannot open.
    pub async fn new(config: &ChatConfig) -> ChatResult<Arc<Self>> {
        config.validate()?;
        let store = SqliteConversationStore::new(&config.storage).await?;
        Ok(Self::with_store(Arc::new(store), &config.server))
    }

    /// Build the state around an already opened store.
    #[must_use]
    pub fn with_store(store: Arc<dyn ConversationStore>, server: &ServerConfig) -> Arc<Self> {
        let generations = GenerationTracker::new();
        let actions = ConversationActions::new(Arc::clone(&store), Arc::new(generations.clone()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let sender = events.clone();
        let sequence = AtomicU64::new(0);
        let subscription = store.notifier().subscribe(move || {
            let next = sequence.fetch_add(1, Ordering::Relaxed) + 1;
            // No receivers simply means no SSE client is connected.
            let _ = sender.send(next);
        });

        Arc::new(Self {
            store,
            actions,
            generations,
            events,
            default_locale: server.default_locale.clone(),
            subscription,
        })
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.store.notifier().unsubscribe(self.subscription);
    }
}
