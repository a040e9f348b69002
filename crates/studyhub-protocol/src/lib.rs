//! # studyhub-protocol
//!
//! Wire protocol for the StudyHub realtime hub.
//!
//! A hub connection carries length-prefixed MessagePack frames. Clients
//! invoke hub methods and the server pushes room events back:
//!
//! - `JoinGroup` / `LeaveGroup` - Study group room membership
//! - `SendMessage` / `SendGroupMessage` - Direct and group chat
//! - `MarkRead` - Read receipts
//! - `Event` - Payloads fanned out through a room
//! - `Ack` / `Error` - Request outcomes
//!
//! ## Example
//!
//! ```rust
//! use studyhub_protocol::{Frame, codec};
//!
//! let frame = Frame::join_group(1, 7);
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, ProtocolError};
pub use frames::{error_codes, Frame, FrameType, PROTOCOL_VERSION};
