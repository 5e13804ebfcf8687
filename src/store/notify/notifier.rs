//! In-process change notification.
//!
//! The store calls [`ChangeNotifier::notify`] once per committed mutation.
//! Every registered handler runs, in registration order, before the next
//! delivery cycle may start. Handlers take no arguments: observers re-query
//! whatever state they need. Nothing is persisted, so observers should
//! re-query full state right after subscribing.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

type Handler = Arc<dyn Fn() + Send + Sync>;

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(u64);

/// Coarse-grained publish/subscribe registry.
pub struct ChangeNotifier {
    // Keys grow monotonically, so iteration order is registration order.
    handlers: Mutex<BTreeMap<u64, Handler>>,
    next_token: AtomicU64,
    cycle: tokio::sync::Mutex<()>,
    revision: AtomicU64,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .field("revision", &self.revision())
            .finish()
    }
}

impl ChangeNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(BTreeMap::new()),
            next_token: AtomicU64::new(1),
            cycle: tokio::sync::Mutex::new(()),
            revision: AtomicU64::new(0),
        }
    }

    /// Register a handler invoked after every committed mutation.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn() + Send + Sync + 'static,
    {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.registry().insert(token, Arc::new(handler));
        debug!(token, "Subscribed change handler");
        SubscriptionToken(token)
    }

    /// Register an async handler.
    ///
    /// Each delivery spawns the returned future on the current tokio runtime;
    /// the notifier does not wait for it.
    pub fn subscribe_async<F, Fut>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.subscribe(move || {
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(handler());
            }
        })
    }

    /// Remove a handler. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let removed = self.registry().remove(&token.0).is_some();
        if removed {
            debug!(token = token.0, "Unsubscribed change handler");
        }
        removed
    }

    /// Deliver one change notification to every current subscriber.
    pub async fn notify(&self) {
        let _cycle = self.cycle.lock().await;
        // Snapshot so handlers may (un)subscribe without deadlocking.
        let handlers: Vec<Handler> = self.registry().values().cloned().collect();
        for handler in &handlers {
            handler();
        }
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(revision, delivered = handlers.len(), "Change notification delivered");
    }

    /// Number of completed delivery cycles.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
