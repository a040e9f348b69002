//! Room-membership table and message routing.
//!
//! The router maps each connection to the set of rooms it holds and each
//! room to its subscribers. Both sides live in `DashMap`s; callers never see
//! the maps themselves.

use crate::identity::ConnectionId;
use crate::message::Message;
use crate::room::{Room, RoomName};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Not subscribed to room: {0}")]
    NotSubscribed(RoomName),

    #[error("Already subscribed to room: {0}")]
    AlreadySubscribed(RoomName),

    #[error("Maximum group rooms per connection reached")]
    MaxSubscriptionsReached,

    #[error("Maximum number of rooms reached")]
    MaxRoomsReached,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum number of live rooms.
    pub max_rooms: usize,
    /// Maximum study group rooms a single connection may hold. The user
    /// room never counts. `None` means unlimited.
    pub max_subscriptions_per_connection: Option<usize>,
    /// Broadcast buffer of each room.
    pub room_capacity: usize,
    /// Drop rooms once their last subscriber leaves.
    pub auto_delete_empty_rooms: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_rooms: 100_000,
            max_subscriptions_per_connection: None,
            room_capacity: 1024,
            auto_delete_empty_rooms: true,
        }
    }
}

/// The room-membership table.
pub struct Router {
    rooms: DashMap<RoomName, Room>,
    /// connection -> rooms it holds
    subscriptions: DashMap<ConnectionId, HashSet<RoomName>>,
    config: RouterConfig,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            rooms: DashMap::new(),
            subscriptions: DashMap::new(),
            config,
        }
    }

    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            room_count: self.rooms.len(),
            connection_count: self.subscriptions.len(),
            total_subscriptions: self.subscriptions.iter().map(|s| s.len()).sum(),
        }
    }

    /// Subscribe a connection to a room, creating the room if needed.
    ///
    /// Returns a receiver for messages published to the room from now on.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection already holds the room or a limit
    /// is exceeded.
    pub fn subscribe(
        &self,
        connection_id: &ConnectionId,
        room: &RoomName,
    ) -> Result<broadcast::Receiver<Arc<Message>>, RouterError> {
        let mut conn_subs = self
            .subscriptions
            .entry(connection_id.clone())
            .or_default();

        if conn_subs.contains(room) {
            return Err(RouterError::AlreadySubscribed(room.clone()));
        }
        if let Some(limit) = self.config.max_subscriptions_per_connection {
            let group_rooms = conn_subs.iter().filter(|r| !r.is_user_room()).count();
            if !room.is_user_room() && group_rooms >= limit {
                return Err(RouterError::MaxSubscriptionsReached);
            }
        }
        if !self.rooms.contains_key(room) && self.rooms.len() >= self.config.max_rooms {
            return Err(RouterError::MaxRoomsReached);
        }

        let mut entry = self.rooms.entry(room.clone()).or_insert_with(|| {
            debug!(room = %room, "Creating room");
            Room::with_capacity(room.clone(), self.config.room_capacity)
        });

        let receiver = entry.subscribe(connection_id.clone());
        conn_subs.insert(room.clone());

        debug!(
            room = %room,
            connection = %connection_id,
            subscribers = entry.subscriber_count(),
            "Subscribed"
        );

        Ok(receiver)
    }

    /// Remove a connection from a room.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::NotSubscribed`] if the connection does not hold the room.
    pub fn unsubscribe(
        &self,
        connection_id: &ConnectionId,
        room: &RoomName,
    ) -> Result<(), RouterError> {
        let removed = self
            .subscriptions
            .get_mut(connection_id)
            .is_some_and(|mut subs| subs.remove(room));
        if !removed {
            return Err(RouterError::NotSubscribed(room.clone()));
        }
        self.subscriptions
            .remove_if(connection_id, |_, subs| subs.is_empty());

        self.detach(connection_id, room);
        Ok(())
    }

    /// Remove a connection from every room it holds.
    ///
    /// Returns the rooms that were left.
    pub fn unsubscribe_all(&self, connection_id: &ConnectionId) -> Vec<RoomName> {
        let rooms: Vec<RoomName> = self
            .subscriptions
            .remove(connection_id)
            .map(|(_, rooms)| rooms.into_iter().collect())
            .unwrap_or_default();

        for room in &rooms {
            self.detach(connection_id, room);
        }

        debug!(connection = %connection_id, rooms = rooms.len(), "Unsubscribed from all rooms");
        rooms
    }

    fn detach(&self, connection_id: &ConnectionId, room: &RoomName) {
        if let Some(mut entry) = self.rooms.get_mut(room) {
            entry.unsubscribe(connection_id);
            debug!(
                room = %room,
                connection = %connection_id,
                subscribers = entry.subscriber_count(),
                "Unsubscribed"
            );
        }

        if self.config.auto_delete_empty_rooms
            && self.rooms.remove_if(room, |_, r| r.is_empty()).is_some()
        {
            debug!(room = %room, "Deleted empty room");
        }
    }

    /// Publish a message to its room.
    ///
    /// Returns the number of receivers. A room nobody holds yields 0.
    pub fn publish(&self, message: Message) -> usize {
        let room = message.room.clone();
        match self.rooms.get(&room) {
            Some(entry) => {
                let count = entry.publish(message);
                trace!(room = %room, recipients = count, "Published message");
                count
            }
            None => {
                trace!(room = %room, "Publish to room without subscribers");
                0
            }
        }
    }

    #[must_use]
    pub fn is_subscribed(&self, connection_id: &ConnectionId, room: &RoomName) -> bool {
        self.subscriptions
            .get(connection_id)
            .is_some_and(|subs| subs.contains(room))
    }

    #[must_use]
    pub fn room_exists(&self, room: &RoomName) -> bool {
        self.rooms.contains_key(room)
    }

    #[must_use]
    pub fn subscriber_count(&self, room: &RoomName) -> usize {
        self.rooms
            .get(room)
            .map(|r| r.subscriber_count())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn room_names(&self) -> Vec<RoomName> {
        self.rooms.iter().map(|e| e.key().clone()).collect()
    }

    /// Rooms a connection currently holds.
    #[must_use]
    pub fn connection_rooms(&self, connection_id: &ConnectionId) -> Vec<RoomName> {
        let mut rooms: Vec<RoomName> = self
            .subscriptions
            .get(connection_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of connections holding at least one room.
    pub connection_count: usize,
    /// Total number of (connection, room) pairs.
    pub total_subscriptions: usize,
}
