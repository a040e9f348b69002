//! Rooms: named fan-out groups of connections.
//!
//! Room names are derived from domain ids and have no storage of their own:
//!
//! - `User_{userId}` - private delivery room of one user
//! - `StudyGroup_{groupId}` - chat room of one study group

use crate::identity::{ConnectionId, GroupId, UserId};
use crate::message::Message;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default broadcast capacity of a room.
const DEFAULT_ROOM_CAPACITY: usize = 1024;

const USER_ROOM_PREFIX: &str = "User_";
const GROUP_ROOM_PREFIX: &str = "StudyGroup_";

/// Name of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomName(String);

impl RoomName {
    /// Private room of a user.
    #[must_use]
    pub fn user(user_id: &UserId) -> Self {
        Self(format!("{USER_ROOM_PREFIX}{user_id}"))
    }

    /// Chat room of a study group.
    #[must_use]
    pub fn study_group(group_id: GroupId) -> Self {
        Self(format!("{GROUP_ROOM_PREFIX}{group_id}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is a user's private room.
    #[must_use]
    pub fn is_user_room(&self) -> bool {
        self.0.starts_with(USER_ROOM_PREFIX)
    }

    /// The study group id, for `StudyGroup_{id}` rooms.
    #[must_use]
    pub fn study_group_id(&self) -> Option<GroupId> {
        self.0.strip_prefix(GROUP_ROOM_PREFIX)?.parse().ok()
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A room and the connections subscribed to it.
#[derive(Debug)]
pub struct Room {
    name: RoomName,
    sender: broadcast::Sender<Arc<Message>>,
    subscribers: HashSet<ConnectionId>,
}

impl Room {
    #[must_use]
    pub fn new(name: RoomName) -> Self {
        Self::with_capacity(name, DEFAULT_ROOM_CAPACITY)
    }

    /// Create a room whose broadcast buffer holds `capacity` messages.
    #[must_use]
    pub fn with_capacity(name: RoomName, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name,
            sender,
            subscribers: HashSet::new(),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, connection_id: &ConnectionId) -> bool {
        self.subscribers.contains(connection_id)
    }

    /// Add a connection to the room.
    ///
    /// Returns a receiver for messages published from now on.
    pub fn subscribe(&mut self, connection_id: ConnectionId) -> broadcast::Receiver<Arc<Message>> {
        debug!(room = %self.name, connection = %connection_id, "Connection joined room");
        self.subscribers.insert(connection_id);
        self.sender.subscribe()
    }

    /// Remove a connection from the room.
    ///
    /// Returns `true` if the connection was subscribed.
    pub fn unsubscribe(&mut self, connection_id: &ConnectionId) -> bool {
        let removed = self.subscribers.remove(connection_id);
        if removed {
            debug!(room = %self.name, connection = %connection_id, "Connection left room");
        }
        removed
    }

    /// Publish a message to every live receiver of this room.
    ///
    /// Returns the number of receivers; zero is not an error.
    pub fn publish(&self, message: Message) -> usize {
        trace!(room = %self.name, event = %message.event, "Publishing message");
        self.sender.send(Arc::new(message)).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_names() {
        assert_eq!(RoomName::user(&UserId::new("abc-123")).as_str(), "User_abc-123");
        assert_eq!(RoomName::study_group(7).as_str(), "StudyGroup_7");
        assert!(RoomName::user(&UserId::new("a")).is_user_room());
        assert_eq!(RoomName::study_group(42).study_group_id(), Some(42));
        assert_eq!(RoomName::user(&UserId::new("42")).study_group_id(), None);
    }

    #[test]
    fn test_user_room_is_not_escaped() {
        let room = RoomName::user(&UserId::new("Bob_Smith"));
        assert_eq!(room.as_str(), "User_Bob_Smith");
    }

    #[test]
    fn test_room_subscribe_unsubscribe() {
        let mut room = Room::new(RoomName::study_group(1));
        let conn = ConnectionId::new("conn-1");

        let _rx = room.subscribe(conn.clone());
        assert!(room.is_subscribed(&conn));
        assert_eq!(room.subscriber_count(), 1);

        assert!(room.unsubscribe(&conn));
        assert!(!room.unsubscribe(&conn));
        assert!(room.is_empty());
    }

    #[tokio::test]
    async fn test_room_publish() {
        let mut room = Room::new(RoomName::study_group(1));
        let mut rx = room.subscribe(ConnectionId::new("conn-1"));

        let message = Message::new(RoomName::study_group(1), "ReceiveGroupMessage", b"hello".to_vec());
        assert_eq!(room.publish(message), 1);

        let msg = rx.recv().await.unwrap();
        assert_eq!(&msg.payload[..], b"hello");
    }
}
