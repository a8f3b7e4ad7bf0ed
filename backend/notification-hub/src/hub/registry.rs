use std::collections::hash_map::{self, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::connection::BoxedConnection;
use crate::envelope::UserId;

/// Identifies one accepted registration of a recipient
pub type ConnectionId = Uuid;

/// A live recipient, owned exclusively by the hub loop
pub(crate) struct ConnectionEntry {
    pub connection_id: ConnectionId,
    pub connection: BoxedConnection,
    /// Fixed at registration
    pub language: String,
    pub connected_at: DateTime<Utc>,
}

/// Recipient identity -> live connection
///
/// Never shared: the hub loop is the only place it is read or mutated.
#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<UserId, ConnectionEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, handing back the one it displaced
    pub fn insert(&mut self, user_id: UserId, entry: ConnectionEntry) -> Option<ConnectionEntry> {
        self.entries.insert(user_id, entry)
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<ConnectionEntry> {
        self.entries.remove(&user_id)
    }

    /// Remove only if the current entry is the given registration
    pub fn remove_if(&mut self, user_id: UserId, connection_id: ConnectionId) -> Option<ConnectionEntry> {
        match self.entries.get(&user_id) {
            Some(entry) if entry.connection_id == connection_id => self.entries.remove(&user_id),
            _ => None,
        }
    }

    /// Language the recipient registered with
    pub fn language(&self, user_id: UserId) -> Option<&str> {
        self.entries.get(&user_id).map(|entry| entry.language.as_str())
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.entries.contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.entries.keys().copied().collect()
    }

    /// Each recipient with the language it registered with
    pub fn languages(&self) -> Vec<(UserId, String)> {
        self.entries
            .iter()
            .map(|(user_id, entry)| (*user_id, entry.language.clone()))
            .collect()
    }

    pub fn iter_mut(&mut self) -> hash_map::IterMut<'_, UserId, ConnectionEntry> {
        self.entries.iter_mut()
    }

    pub fn drain(&mut self) -> hash_map::Drain<'_, UserId, ConnectionEntry> {
        self.entries.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ChannelConnection;

    fn entry(language: &str) -> ConnectionEntry {
        let (connection, _rx) = ChannelConnection::boxed();
        ConnectionEntry {
            connection_id: Uuid::new_v4(),
            connection,
            language: language.to_string(),
            connected_at: Utc::now(),
        }
    }

    #[test]
    fn test_registry_insert_and_remove() {
        let mut registry = Registry::new();
        assert_eq!(registry.len(), 0);

        assert!(registry.insert(1, entry("en")).is_none());
        assert!(registry.contains(1));
        assert_eq!(registry.len(), 1);

        assert!(registry.remove(1).is_some());
        assert!(registry.remove(1).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_registry_keeps_one_entry_per_identity() {
        let mut registry = Registry::new();
        registry.insert(1, entry("en"));
        let displaced = registry.insert(1, entry("es"));

        assert_eq!(displaced.map(|e| e.language), Some("en".to_string()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.language(1), Some("es"));
        assert_eq!(registry.language(2), None);
    }

    #[test]
    fn test_remove_if_ignores_stale_connection_id() {
        let mut registry = Registry::new();
        let first = entry("en");
        let stale_id = first.connection_id;
        registry.insert(1, first);

        let second = entry("en");
        let current_id = second.connection_id;
        registry.insert(1, second);

        assert!(registry.remove_if(1, stale_id).is_none());
        assert!(registry.contains(1));
        assert!(registry.remove_if(1, current_id).is_some());
        assert!(!registry.contains(1));
    }

    #[test]
    fn test_registry_user_ids_and_drain() {
        let mut registry = Registry::new();
        for id in 1..=3 {
            registry.insert(id, entry("en"));
        }

        let mut ids = registry.user_ids();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);

        assert_eq!(registry.drain().count(), 3);
        assert_eq!(registry.len(), 0);
    }
}
