//! Online presence of users.
//!
//! A user is online while at least one identified connection of theirs is
//! open. Only the connection binder updates presence.

use crate::identity::{ConnectionId, UserId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Presence of one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceState {
    pub user_id: UserId,
    /// When the user's oldest open connection was opened.
    pub online_since: DateTime<Utc>,
    /// Number of open connections (tabs, devices).
    pub connections: usize,
}

#[derive(Debug, Default)]
struct UserConnections {
    opened: HashMap<ConnectionId, DateTime<Utc>>,
}

impl UserConnections {
    fn state(&self, user_id: &UserId) -> Option<PresenceState> {
        let online_since = self.opened.values().min().copied()?;
        Some(PresenceState {
            user_id: user_id.clone(),
            online_since,
            connections: self.opened.len(),
        })
    }
}

/// Presence tracker for all users.
#[derive(Debug, Default)]
pub struct Presence {
    users: DashMap<UserId, UserConnections>,
}

impl Presence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an open connection.
    ///
    /// Returns `true` if the user just came online.
    pub fn connect(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        let mut entry = self.users.entry(user_id.clone()).or_default();
        let came_online = entry.opened.is_empty();
        entry.opened.insert(connection_id.clone(), Utc::now());

        if came_online {
            debug!(user = %user_id, connection = %connection_id, "Presence: user online");
        }
        came_online
    }

    /// Record a closed connection.
    ///
    /// Returns `true` if the user went offline.
    pub fn disconnect(&self, user_id: &UserId, connection_id: &ConnectionId) -> bool {
        let removed = self
            .users
            .get_mut(user_id)
            .is_some_and(|mut entry| entry.opened.remove(connection_id).is_some());
        if !removed {
            return false;
        }

        let went_offline = self
            .users
            .remove_if(user_id, |_, entry| entry.opened.is_empty())
            .is_some();
        if went_offline {
            debug!(user = %user_id, connection = %connection_id, "Presence: user offline");
        }
        went_offline
    }

    #[must_use]
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.users.contains_key(user_id)
    }

    #[must_use]
    pub fn connection_count(&self, user_id: &UserId) -> usize {
        self.users.get(user_id).map_or(0, |e| e.opened.len())
    }

    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<PresenceState> {
        self.users.get(user_id).and_then(|e| e.state(user_id))
    }

    /// Ids of every online user, sorted.
    #[must_use]
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.users.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }

    /// Serializable view of every online user.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PresenceState> {
        self.users
            .iter()
            .filter_map(|e| e.value().state(e.key()))
            .collect()
    }

    #[must_use]
    pub fn online_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_connect_disconnect() {
        let presence = Presence::new();
        let alice = UserId::new("alice");

        assert!(presence.connect(&alice, &ConnectionId::new("tab-1")));
        assert!(!presence.connect(&alice, &ConnectionId::new("tab-2")));
        assert_eq!(presence.connection_count(&alice), 2);

        assert!(!presence.disconnect(&alice, &ConnectionId::new("tab-1")));
        assert!(presence.is_online(&alice));

        assert!(presence.disconnect(&alice, &ConnectionId::new("tab-2")));
        assert!(!presence.is_online(&alice));
    }

    #[test]
    fn test_unknown_disconnect_is_noop() {
        let presence = Presence::new();
        assert!(!presence.disconnect(&UserId::new("ghost"), &ConnectionId::new("conn-1")));
        assert_eq!(presence.online_count(), 0);
    }

    #[test]
    fn test_presence_snapshot() {
        let presence = Presence::new();
        presence.connect(&UserId::new("bob"), &ConnectionId::new("c1"));
        presence.connect(&UserId::new("alice"), &ConnectionId::new("c2"));
        presence.connect(&UserId::new("alice"), &ConnectionId::new("c3"));

        assert_eq!(
            presence.online_users(),
            vec![UserId::new("alice"), UserId::new("bob")]
        );

        let alice = presence.get(&UserId::new("alice")).unwrap();
        assert_eq!(alice.connections, 2);
        assert_eq!(presence.snapshot().len(), 2);
    }
}
