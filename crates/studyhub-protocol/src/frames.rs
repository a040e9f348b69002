//! Frame types for the StudyHub hub protocol.
//!
//! Frames are the unit of communication on a hub connection. Clients invoke
//! hub methods (join a group room, send a direct message, mark a message as
//! read) and the server pushes room events back. Each frame is serialized
//! using MessagePack.

use serde::{Deserialize, Serialize};

/// Current protocol version, reported in the `connected` frame.
pub const PROTOCOL_VERSION: u8 = 1;

/// Error codes carried by [`Frame::Error`].
pub mod error_codes {
    /// The frame could not be decoded or is not valid from a client.
    pub const INVALID_FRAME: u16 = 4000;
    /// The operation needs an identified connection.
    pub const UNAUTHENTICATED: u16 = 4001;
    /// The caller is not allowed to act on the target.
    pub const FORBIDDEN: u16 = 4003;
    /// The target entity does not exist.
    pub const NOT_FOUND: u16 = 4004;
    /// Message content is empty or exceeds the configured bound.
    pub const INVALID_CONTENT: u16 = 4013;
    /// Unexpected server failure.
    pub const INTERNAL: u16 = 5000;
}

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    JoinGroup = 0x01,
    LeaveGroup = 0x02,
    SendMessage = 0x03,
    SendGroupMessage = 0x04,
    MarkRead = 0x05,
    Event = 0x06,
    Ack = 0x07,
    Error = 0x08,
    Ping = 0x09,
    Pong = 0x0A,
    Connected = 0x0B,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::JoinGroup),
            0x02 => Ok(FrameType::LeaveGroup),
            0x03 => Ok(FrameType::SendMessage),
            0x04 => Ok(FrameType::SendGroupMessage),
            0x05 => Ok(FrameType::MarkRead),
            0x06 => Ok(FrameType::Event),
            0x07 => Ok(FrameType::Ack),
            0x08 => Ok(FrameType::Error),
            0x09 => Ok(FrameType::Ping),
            0x0A => Ok(FrameType::Pong),
            0x0B => Ok(FrameType::Connected),
            _ => Err("Invalid frame type"),
        }
    }
}

/// A protocol frame.
///
/// None of the client frames carry a sender id: the server derives the
/// sender from the connection's authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Ask to be admitted to a study group's room.
    #[serde(rename = "join_group")]
    JoinGroup {
        /// Always acked, whatever the outcome.
        id: u64,
        /// Study group to join.
        group_id: i64,
    },

    /// Leave a study group's room.
    #[serde(rename = "leave_group")]
    LeaveGroup {
        /// Always acked, whatever the outcome.
        id: u64,
        /// Study group to leave.
        group_id: i64,
    },

    /// Send a direct message to another user.
    #[serde(rename = "send_message")]
    SendMessage {
        /// Acked when present.
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        /// Receiving user.
        receiver_id: String,
        /// Message body.
        content: String,
    },

    /// Send a chat message to a study group room the connection has joined.
    #[serde(rename = "send_group_message")]
    SendGroupMessage {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        group_id: i64,
        content: String,
    },

    /// Mark a received direct message as read.
    #[serde(rename = "mark_read")]
    MarkRead {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        message_id: i64,
    },

    /// A payload pushed to the connection through one of its rooms.
    #[serde(rename = "event")]
    Event {
        /// Room the payload was fanned out to.
        room: String,
        /// Event name (`ReceiveMessage`, `MessageRead`, ...).
        event: String,
        /// Opaque payload.
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },

    /// A request succeeded.
    #[serde(rename = "ack")]
    Ack {
        /// Id of the request.
        id: u64,
    },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// Error code, see [`error_codes`].
        code: u16,
        /// Text for logs; clients branch on `code`.
        message: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Timestamp copied from the ping.
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Sent once by the server after the upgrade completes.
    #[serde(rename = "connected")]
    Connected {
        /// Server-assigned id of this connection.
        connection_id: String,
        /// Identity bound to the connection, `None` for anonymous sockets.
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Protocol version.
        version: u8,
        /// How often the client should ping, in milliseconds.
        heartbeat: u32,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::JoinGroup { .. } => FrameType::JoinGroup,
            Frame::LeaveGroup { .. } => FrameType::LeaveGroup,
            Frame::SendMessage { .. } => FrameType::SendMessage,
            Frame::SendGroupMessage { .. } => FrameType::SendGroupMessage,
            Frame::MarkRead { .. } => FrameType::MarkRead,
            Frame::Event { .. } => FrameType::Event,
            Frame::Ack { .. } => FrameType::Ack,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
        }
    }

    /// Whether a client is allowed to send this frame.
    #[must_use]
    pub fn is_client_frame(&self) -> bool {
        matches!(
            self,
            Frame::JoinGroup { .. }
                | Frame::LeaveGroup { .. }
                | Frame::SendMessage { .. }
                | Frame::SendGroupMessage { .. }
                | Frame::MarkRead { .. }
                | Frame::Ping { .. }
                | Frame::Pong { .. }
        )
    }

    /// Create a JoinGroup frame.
    #[must_use]
    pub fn join_group(id: u64, group_id: i64) -> Self {
        Frame::JoinGroup { id, group_id }
    }

    /// Create a LeaveGroup frame.
    #[must_use]
    pub fn leave_group(id: u64, group_id: i64) -> Self {
        Frame::LeaveGroup { id, group_id }
    }

    /// Create a SendMessage frame without acknowledgment.
    #[must_use]
    pub fn send_message(receiver_id: impl Into<String>, content: impl Into<String>) -> Self {
        Frame::SendMessage {
            id: None,
            receiver_id: receiver_id.into(),
            content: content.into(),
        }
    }

    /// Create a SendMessage frame with ID for acknowledgment.
    #[must_use]
    pub fn send_message_with_ack(
        id: u64,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Frame::SendMessage {
            id: Some(id),
            receiver_id: receiver_id.into(),
            content: content.into(),
        }
    }

    /// Create a SendGroupMessage frame.
    #[must_use]
    pub fn send_group_message(id: Option<u64>, group_id: i64, content: impl Into<String>) -> Self {
        Frame::SendGroupMessage {
            id,
            group_id,
            content: content.into(),
        }
    }

    /// Create a MarkRead frame.
    #[must_use]
    pub fn mark_read(id: Option<u64>, message_id: i64) -> Self {
        Frame::MarkRead { id, message_id }
    }

    /// Create an Event frame.
    #[must_use]
    pub fn event(
        room: impl Into<String>,
        event: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Frame::Event {
            room: room.into(),
            event: event.into(),
            payload: payload.into(),
        }
    }

    /// Acknowledge request `id`.
    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    /// Reject request `id` (0 when the failure is not tied to a request).
    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Keepalive without a timestamp.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Answer a ping, echoing its timestamp.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a Connected frame.
    #[must_use]
    pub fn connected(
        connection_id: impl Into<String>,
        user_id: Option<String>,
        heartbeat: u32,
    ) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            user_id,
            version: PROTOCOL_VERSION,
            heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type() {
        assert_eq!(Frame::join_group(1, 7).frame_type(), FrameType::JoinGroup);
        assert_eq!(
            Frame::send_message("user-2", "hi").frame_type(),
            FrameType::SendMessage
        );
        assert_eq!(Frame::mark_read(None, 3).frame_type(), FrameType::MarkRead);
    }

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::try_from(0x01), Ok(FrameType::JoinGroup));
        assert_eq!(FrameType::try_from(0x0B), Ok(FrameType::Connected));
        assert!(FrameType::try_from(0x00).is_err());
        assert!(FrameType::try_from(0x0C).is_err());
        assert_eq!(u8::from(FrameType::Event), 0x06);
    }

    #[test]
    fn test_server_frames_are_not_client_frames() {
        assert!(Frame::join_group(1, 1).is_client_frame());
        assert!(Frame::ping().is_client_frame());
        assert!(!Frame::event("User_a", "ReceiveMessage", b"x".to_vec()).is_client_frame());
        assert!(!Frame::connected("conn_1", None, 30_000).is_client_frame());
        assert!(!Frame::ack(1).is_client_frame());
    }

    #[test]
    fn test_connected_carries_protocol_version() {
        match Frame::connected("conn_1", Some("alice".into()), 15_000) {
            Frame::Connected {
                version, user_id, ..
            } => {
                assert_eq!(version, PROTOCOL_VERSION);
                assert_eq!(user_id.as_deref(), Some("alice"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }
}
