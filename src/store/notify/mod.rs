//! Post-commit change notification.

pub mod notifier;

pub use notifier::{ChangeNotifier, SubscriptionToken};
