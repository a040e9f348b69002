//! Messages routed through rooms.

use crate::identity::ConnectionId;
use crate::room::RoomName;
use bytes::Bytes;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Event names pushed to clients.
pub mod events {
    /// A direct message, delivered to the receiver and echoed to the sender.
    pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
    /// A direct message was read by its receiver.
    pub const MESSAGE_READ: &str = "MessageRead";
    /// A chat message posted to a study group room.
    pub const RECEIVE_GROUP_MESSAGE: &str = "ReceiveGroupMessage";
}

/// Process-local routing sequence number.
pub type RoutingId = u64;

static ROUTING_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A message routed to one room.
#[derive(Debug, Clone)]
pub struct Message {
    /// Routing sequence number, unique within the process.
    pub id: RoutingId,
    /// Connection that triggered the message, if any.
    pub source: Option<ConnectionId>,
    /// Target room.
    pub room: RoomName,
    /// Event name, see [`events`].
    pub event: String,
    /// Opaque payload, shared between all receivers.
    pub payload: Bytes,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Message {
    #[must_use]
    pub fn new(room: RoomName, event: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            id: ROUTING_COUNTER.fetch_add(1, Ordering::Relaxed),
            source: None,
            room,
            event: event.into(),
            payload: payload.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Attach the originating connection.
    #[must_use]
    pub fn with_source(mut self, source: ConnectionId) -> Self {
        self.source = Some(source);
        self
    }

    /// Copy of this message addressed to another room.
    ///
    /// The payload buffer is shared, not copied.
    #[must_use]
    pub fn readdressed(&self, room: RoomName) -> Self {
        Self {
            id: ROUTING_COUNTER.fetch_add(1, Ordering::Relaxed),
            room,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}
