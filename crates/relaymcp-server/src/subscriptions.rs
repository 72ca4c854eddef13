//! Resource subscription fan-out (spec §4.9): `resources/subscribe` adds
//! `(uri, session_id)` to a set; `notifyResourceUpdated(uri)` is routed to
//! every subscribed session's standalone stream.

use dashmap::DashMap;
use dashmap::DashSet;

/// `uri -> set of subscribed session ids`.
pub struct SubscriptionRegistry {
    by_uri: DashMap<String, DashSet<String>>,
}

impl SubscriptionRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_uri: DashMap::new(),
        }
    }

    /// Subscribe `session_id` to `uri`.
    pub fn subscribe(&self, uri: impl Into<String>, session_id: impl Into<String>) {
        self.by_uri
            .entry(uri.into())
            .or_default()
            .insert(session_id.into());
    }

    /// Unsubscribe `session_id` from `uri`. A no-op if not subscribed.
    pub fn unsubscribe(&self, uri: &str, session_id: &str) {
        if let Some(set) = self.by_uri.get(uri) {
            set.remove(session_id);
        }
    }

    /// Every session subscribed to `uri`.
    #[must_use]
    pub fn subscribers_of(&self, uri: &str) -> Vec<String> {
        self.by_uri
            .get(uri)
            .map(|set| set.iter().map(|id| id.clone()).collect())
            .unwrap_or_default()
    }

    /// Remove a session from every subscription set (called on session
    /// teardown, spec §4.2).
    pub fn remove_session(&self, session_id: &str) {
        for entry in self.by_uri.iter() {
            entry.value().remove(session_id);
        }
    }

    /// Drop every subscriber of `uri` (called when the resource itself is
    /// unregistered).
    pub fn remove_uri(&self, uri: &str) {
        self.by_uri.remove(uri);
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_subscribed_sessions_are_returned() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("test://r", "a");
        assert_eq!(registry.subscribers_of("test://r"), vec!["a".to_string()]);
        assert!(registry.subscribers_of("test://other").is_empty());
    }

    #[test]
    fn unsubscribe_removes_just_that_session() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("test://r", "a");
        registry.subscribe("test://r", "b");
        registry.unsubscribe("test://r", "a");
        assert_eq!(registry.subscribers_of("test://r"), vec!["b".to_string()]);
    }

    #[test]
    fn session_teardown_clears_every_uri() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe("test://a", "s1");
        registry.subscribe("test://b", "s1");
        registry.remove_session("s1");
        assert!(registry.subscribers_of("test://a").is_empty());
        assert!(registry.subscribers_of("test://b").is_empty());
    }
}
