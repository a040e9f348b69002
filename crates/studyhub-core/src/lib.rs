//! # studyhub-core
//!
//! Realtime presence and messaging for StudyHub study groups.
//!
//! - **Room** - Named fan-out group (`User_{id}`, `StudyGroup_{id}`)
//! - **Router** - Concurrency-safe room-membership table
//! - **Presence** - Which users have an open connection
//! - **Store** - Membership and direct message persistence boundary
//! - **Hub** - Connection binder, group room gate and message fan-out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Connection │────▶│     Hub     │────▶│   Router    │──▶ Rooms
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                        │       │
//!                        ▼       ▼
//!                 ┌──────────┐ ┌──────────────────┐
//!                 │ Presence │ │ MembershipStore  │
//!                 └──────────┘ └──────────────────┘
//! ```

pub mod hub;
pub mod identity;
pub mod message;
pub mod presence;
pub mod room;
pub mod router;
pub mod store;

pub use hub::{FanOut, Hub, HubConnection, HubError, HubStats, JoinOutcome};
pub use identity::{ConnectionId, GroupId, Identity, UserId};
pub use message::{events, Message};
pub use presence::{Presence, PresenceState};
pub use room::{Room, RoomName};
pub use router::{Router, RouterConfig, RouterError, RouterStats};
pub use store::{
    ContentError, DirectMessage, DirectMessageStore, Membership, MembershipStore, MemoryStore,
    NewDirectMessage, ReadMark, StoreError, validate_content, MAX_MESSAGE_LENGTH,
};
