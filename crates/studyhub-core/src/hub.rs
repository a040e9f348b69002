//! The realtime hub.
//!
//! The hub ties a connection's identity to its rooms:
//!
//! - on connect, an identified connection joins its user room `User_{id}`;
//!   on disconnect it leaves that same room, keyed by the identity stored at
//!   connect time
//! - `join_group` admits a connection to `StudyGroup_{id}` after re-checking
//!   the membership against the store; `leave_group` is unconditional
//! - direct messages go to the receiver's user room and are echoed to the
//!   sender's own user room so the sender's other tabs see them
//!
//! Every handler swallows its failures. The worst outcome of any call is a
//! realtime update that nobody sees.

use crate::identity::{ConnectionId, GroupId, Identity, UserId};
use crate::message::{events, Message};
use crate::presence::Presence;
use crate::room::RoomName;
use crate::router::{Router, RouterConfig, RouterError, RouterStats};
use crate::store::{MembershipStore, StoreError};
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Failures caught at the hub's handler boundary.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("membership lookup failed: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

/// Result of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The connection now holds the group room.
    Joined,
    /// The connection already held the group room.
    AlreadyJoined,
    /// No approved, live membership (or an anonymous connection).
    Denied,
    /// The check or the subscription failed; the failure was logged.
    Failed,
}

/// Where a fanned-out payload went.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOut {
    /// Rooms the payload was published to.
    pub rooms: Vec<RoomName>,
    /// Live receivers across those rooms at publish time.
    pub receivers: usize,
}

impl FanOut {
    /// Whether the payload was dropped before reaching any room.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        self.rooms.is_empty()
    }
}

/// Hub statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubStats {
    pub connections: usize,
    pub identified_connections: usize,
    pub online_users: usize,
    pub router: RouterStats,
}

/// The caller's side of a registered connection.
#[derive(Debug)]
pub struct HubConnection {
    pub id: ConnectionId,
    pub identity: Identity,
    /// Every message published to a room this connection holds.
    pub deliveries: mpsc::UnboundedReceiver<Arc<Message>>,
}

struct ConnectionEntry {
    identity: Identity,
    outbox: mpsc::UnboundedSender<Arc<Message>>,
    forwarders: HashMap<RoomName, JoinHandle<()>>,
}

impl ConnectionEntry {
    fn stop_forwarder(&mut self, room: &RoomName) {
        if let Some(handle) = self.forwarders.remove(room) {
            handle.abort();
        }
    }
}

impl Drop for ConnectionEntry {
    fn drop(&mut self) {
        for (_, handle) in self.forwarders.drain() {
            handle.abort();
        }
    }
}

/// The realtime hub.
pub struct Hub {
    router: Router,
    presence: Presence,
    connections: DashMap<ConnectionId, ConnectionEntry>,
    memberships: Arc<dyn MembershipStore>,
}

impl Hub {
    #[must_use]
    pub fn new(memberships: Arc<dyn MembershipStore>) -> Self {
        Self::with_config(memberships, RouterConfig::default())
    }

    #[must_use]
    pub fn with_config(memberships: Arc<dyn MembershipStore>, config: RouterConfig) -> Self {
        Self {
            router: Router::with_config(config),
            presence: Presence::new(),
            connections: DashMap::new(),
            memberships,
        }
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn presence(&self) -> &Presence {
        &self.presence
    }

    /// Register a new connection.
    ///
    /// An identified connection joins its user room. Anonymous connections
    /// are registered but join nothing. Must be called inside a Tokio runtime.
    pub fn on_connected(&self, identity: Identity) -> HubConnection {
        let id = ConnectionId::generate();
        let (outbox, deliveries) = mpsc::unbounded_channel();

        self.connections.insert(
            id.clone(),
            ConnectionEntry {
                identity: identity.clone(),
                outbox,
                forwarders: HashMap::new(),
            },
        );

        match identity.user_id() {
            Some(user_id) => {
                let room = RoomName::user(user_id);
                match self.attach(&id, &room) {
                    Ok(_) => {
                        self.presence.connect(user_id, &id);
                        info!(connection = %id, user = %user_id, "Connection identified");
                    }
                    Err(e) => {
                        warn!(connection = %id, user = %user_id, error = %e, "Could not join user room");
                    }
                }
            }
            None => debug!(connection = %id, "Anonymous connection, no user room"),
        }

        HubConnection {
            id,
            identity,
            deliveries,
        }
    }

    /// Tear down a connection, clean or abrupt.
    ///
    /// Leaves the user room of the identity stored at connect time, then
    /// every other room. Calling it twice is a no-op.
    pub fn on_disconnected(&self, connection_id: &ConnectionId) {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            debug!(connection = %connection_id, "Disconnect of unknown connection");
            return;
        };

        if let Some(user_id) = entry.identity.user_id() {
            let room = RoomName::user(user_id);
            if let Err(e) = self.router.unsubscribe(connection_id, &room) {
                debug!(connection = %connection_id, room = %room, error = %e, "User room already left");
            }
            self.presence.disconnect(user_id, connection_id);
        }
        let left = self.router.unsubscribe_all(connection_id);
        drop(entry);

        info!(
            connection = %connection_id,
            group_rooms = left.len(),
            "Connection closed"
        );
    }

    /// Identity bound to a connection.
    #[must_use]
    pub fn identity(&self, connection_id: &ConnectionId) -> Option<Identity> {
        self.connections
            .get(connection_id)
            .map(|entry| entry.identity.clone())
    }

    /// Rooms a connection currently holds, sorted.
    #[must_use]
    pub fn connection_rooms(&self, connection_id: &ConnectionId) -> Vec<RoomName> {
        self.router.connection_rooms(connection_id)
    }

    /// Admit a connection to a study group's room.
    ///
    /// The caller is the user stored on the connection; the membership is
    /// re-read from the store on every call. Failures are logged, never
    /// returned.
    pub async fn join_group(&self, connection_id: &ConnectionId, group_id: GroupId) -> JoinOutcome {
        match self.try_join_group(connection_id, group_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    connection = %connection_id,
                    group = group_id,
                    error = %e,
                    "Join group failed"
                );
                JoinOutcome::Failed
            }
        }
    }

    async fn try_join_group(
        &self,
        connection_id: &ConnectionId,
        group_id: GroupId,
    ) -> Result<JoinOutcome, HubError> {
        let identity = self
            .identity(connection_id)
            .ok_or_else(|| HubError::UnknownConnection(connection_id.clone()))?;
        let Some(user_id) = identity.user_id() else {
            debug!(connection = %connection_id, group = group_id, "Anonymous join denied");
            return Ok(JoinOutcome::Denied);
        };

        let membership = self.memberships.find_membership(group_id, user_id).await?;
        if !membership.is_some_and(|m| m.admits()) {
            debug!(
                connection = %connection_id,
                group = group_id,
                user = %user_id,
                "Join denied, no approved membership"
            );
            return Ok(JoinOutcome::Denied);
        }

        let room = RoomName::study_group(group_id);
        match self.attach(connection_id, &room) {
            Ok(()) => {
                info!(connection = %connection_id, group = group_id, user = %user_id, "Joined group room");
                Ok(JoinOutcome::Joined)
            }
            Err(HubError::Router(RouterError::AlreadySubscribed(_))) => Ok(JoinOutcome::AlreadyJoined),
            Err(e) => Err(e),
        }
    }

    /// Remove a connection from a study group's room. No membership check.
    pub fn leave_group(&self, connection_id: &ConnectionId, group_id: GroupId) {
        let room = RoomName::study_group(group_id);
        if let Some(mut entry) = self.connections.get_mut(connection_id) {
            entry.stop_forwarder(&room);
        }
        match self.router.unsubscribe(connection_id, &room) {
            Ok(()) => debug!(connection = %connection_id, group = group_id, "Left group room"),
            Err(e) => debug!(connection = %connection_id, group = group_id, error = %e, "Leave group ignored"),
        }
    }

    /// Deliver a direct message payload to the receiver's user room and echo
    /// it to the sender's user room.
    ///
    /// The sender is the user stored on the connection. Anonymous senders
    /// are dropped. Persisting the message is the caller's job.
    pub fn send_direct_message(
        &self,
        connection_id: &ConnectionId,
        receiver_id: &UserId,
        payload: impl Into<Bytes>,
    ) -> FanOut {
        let Some(sender_id) = self.sender_of(connection_id) else {
            return FanOut::default();
        };

        let receiver_room = RoomName::user(receiver_id);
        let sender_room = RoomName::user(&sender_id);

        let message = Message::new(receiver_room.clone(), events::RECEIVE_MESSAGE, payload.into())
            .with_source(connection_id.clone());
        let echo = (sender_room != receiver_room).then(|| message.readdressed(sender_room));

        let mut fan_out = FanOut::default();
        for message in std::iter::once(message).chain(echo) {
            fan_out.rooms.push(message.room.clone());
            fan_out.receivers += self.router.publish(message);
        }

        debug!(
            connection = %connection_id,
            sender = %sender_id,
            receiver = %receiver_id,
            receivers = fan_out.receivers,
            "Direct message fanned out"
        );
        fan_out
    }

    /// Tell a message's sender that it was read.
    ///
    /// Publishes `{"messageId": M}` to the sender's user room only.
    pub fn notify_message_read(&self, sender_id: &UserId, message_id: i64) -> usize {
        let payload = serde_json::json!({ "messageId": message_id }).to_string();
        let message = Message::new(RoomName::user(sender_id), events::MESSAGE_READ, payload);
        let receivers = self.router.publish(message);

        debug!(sender = %sender_id, message_id, receivers, "Read receipt sent");
        receivers
    }

    /// Post a payload to a study group room the connection holds.
    ///
    /// Connections outside the room are dropped: admission happens at join.
    pub fn send_group_message(
        &self,
        connection_id: &ConnectionId,
        group_id: GroupId,
        payload: impl Into<Bytes>,
    ) -> FanOut {
        let room = RoomName::study_group(group_id);
        if !self.router.is_subscribed(connection_id, &room) {
            debug!(connection = %connection_id, group = group_id, "Group message from outside the room dropped");
            return FanOut::default();
        }

        let message = Message::new(room.clone(), events::RECEIVE_GROUP_MESSAGE, payload.into())
            .with_source(connection_id.clone());
        let receivers = self.router.publish(message);

        FanOut {
            rooms: vec![room],
            receivers,
        }
    }

    #[must_use]
    pub fn stats(&self) -> HubStats {
        let identified_connections = self
            .connections
            .iter()
            .filter(|e| e.identity.is_identified())
            .count();
        HubStats {
            connections: self.connections.len(),
            identified_connections,
            online_users: self.presence.online_count(),
            router: self.router.stats(),
        }
    }

    fn sender_of(&self, connection_id: &ConnectionId) -> Option<UserId> {
        let sender = self
            .connections
            .get(connection_id)
            .and_then(|entry| entry.identity.user_id().cloned());
        if sender.is_none() {
            debug!(connection = %connection_id, "Message from anonymous or unknown connection dropped");
        }
        sender
    }

    /// Subscribe a registered connection to a room and forward the room's
    /// traffic into its delivery queue.
    fn attach(&self, connection_id: &ConnectionId, room: &RoomName) -> Result<(), HubError> {
        let mut entry = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| HubError::UnknownConnection(connection_id.clone()))?;

        let rx = self.router.subscribe(connection_id, room)?;
        let handle = spawn_forwarder(
            connection_id.clone(),
            room.clone(),
            rx,
            entry.outbox.clone(),
        );
        entry.forwarders.insert(room.clone(), handle);
        Ok(())
    }
}

fn spawn_forwarder(
    connection_id: ConnectionId,
    room: RoomName,
    mut rx: broadcast::Receiver<Arc<Message>>,
    outbox: mpsc::UnboundedSender<Arc<Message>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(message) => {
                    if outbox.send(message).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(connection = %connection_id, room = %room, skipped, "Delivery lagged");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Membership, MemoryStore};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::time::timeout;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn identified(id: &str) -> Identity {
        Identity::Identified(user(id))
    }

    fn hub_with_store() -> (Hub, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Hub::new(store.clone()), store)
    }

    async fn next(conn: &mut HubConnection) -> Arc<Message> {
        timeout(Duration::from_secs(1), conn.deliveries.recv())
            .await
            .expect("delivery timed out")
            .expect("delivery queue closed")
    }

    async fn assert_silent(conn: &mut HubConnection) {
        assert!(
            timeout(Duration::from_millis(50), conn.deliveries.recv())
                .await
                .is_err(),
            "unexpected delivery"
        );
    }

    struct FailingStore;

    #[async_trait]
    impl MembershipStore for FailingStore {
        async fn find_membership(
            &self,
            _group_id: GroupId,
            _user_id: &UserId,
        ) -> Result<Option<Membership>, StoreError> {
            Err(StoreError::Backend("database is locked".into()))
        }
    }

    #[tokio::test]
    async fn test_identified_connection_holds_user_room_until_disconnect() {
        let (hub, _) = hub_with_store();
        let conn = hub.on_connected(identified("alice"));
        let room = RoomName::user(&user("alice"));

        assert_eq!(hub.connection_rooms(&conn.id), vec![room.clone()]);
        assert!(hub.presence().is_online(&user("alice")));

        hub.on_disconnected(&conn.id);
        assert!(hub.connection_rooms(&conn.id).is_empty());
        assert!(!hub.router().room_exists(&room));
        assert!(!hub.presence().is_online(&user("alice")));

        // Second teardown is a no-op.
        hub.on_disconnected(&conn.id);
    }

    #[tokio::test]
    async fn test_any_user_id_gets_its_user_room() {
        let (hub, _) = hub_with_store();
        let long_id = "u".repeat(300);

        for id in ["josé", "Zoë Ångström", long_id.as_str()] {
            let mut conn = hub.on_connected(identified(id));
            assert_eq!(hub.connection_rooms(&conn.id), vec![RoomName::user(&user(id))]);
            assert!(hub.presence().is_online(&user(id)));

            let sender = hub.on_connected(identified("sender"));
            hub.send_direct_message(&sender.id, &user(id), "hola");
            assert_eq!(&next(&mut conn).await.payload[..], b"hola");
            hub.on_disconnected(&sender.id);
        }
    }

    #[tokio::test]
    async fn test_member_of_many_groups_joins_them_all() {
        let (hub, store) = hub_with_store();
        for group in 1..=150 {
            store.approve(group, &user("alice"));
        }
        let conn = hub.on_connected(identified("alice"));

        for group in 1..=150 {
            assert_eq!(hub.join_group(&conn.id, group).await, JoinOutcome::Joined);
        }
        let rooms = hub.connection_rooms(&conn.id);
        assert_eq!(rooms.len(), 151);
        assert!(rooms.contains(&RoomName::study_group(150)));
    }

    #[tokio::test]
    async fn test_group_room_limit_never_blocks_user_room() {
        let store = Arc::new(MemoryStore::new());
        store.approve(1, &user("alice"));
        store.approve(2, &user("alice"));
        let hub = Hub::with_config(
            store,
            RouterConfig {
                max_subscriptions_per_connection: Some(1),
                ..RouterConfig::default()
            },
        );

        let conn = hub.on_connected(identified("alice"));
        assert_eq!(hub.join_group(&conn.id, 1).await, JoinOutcome::Joined);
        assert_eq!(hub.join_group(&conn.id, 2).await, JoinOutcome::Failed);
        assert!(hub
            .connection_rooms(&conn.id)
            .contains(&RoomName::user(&user("alice"))));
    }

    #[tokio::test]
    async fn test_anonymous_connection_holds_no_rooms() {
        let (hub, _) = hub_with_store();
        let conn = hub.on_connected(Identity::Anonymous);

        assert!(hub.connection_rooms(&conn.id).is_empty());
        assert_eq!(hub.identity(&conn.id), Some(Identity::Anonymous));
        assert_eq!(hub.stats().connections, 1);
        assert_eq!(hub.stats().identified_connections, 0);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_group_rooms_too() {
        let (hub, store) = hub_with_store();
        store.approve(7, &user("alice"));
        let conn = hub.on_connected(identified("alice"));

        assert_eq!(hub.join_group(&conn.id, 7).await, JoinOutcome::Joined);
        hub.on_disconnected(&conn.id);

        assert!(!hub.router().room_exists(&RoomName::study_group(7)));
        assert_eq!(hub.stats().router.total_subscriptions, 0);
    }

    #[tokio::test]
    async fn test_other_tabs_keep_user_room() {
        let (hub, _) = hub_with_store();
        let tab1 = hub.on_connected(identified("alice"));
        let mut tab2 = hub.on_connected(identified("alice"));

        hub.on_disconnected(&tab1.id);
        assert!(hub.presence().is_online(&user("alice")));

        let sender = hub.on_connected(identified("bob"));
        hub.send_direct_message(&sender.id, &user("alice"), "ping");
        assert_eq!(&next(&mut tab2).await.payload[..], b"ping");
    }

    #[tokio::test]
    async fn test_join_group_scenario() {
        let (hub, store) = hub_with_store();
        store.approve(7, &user("A"));

        let a = hub.on_connected(identified("A"));
        let b = hub.on_connected(identified("B"));
        let b_rooms_before = hub.connection_rooms(&b.id);

        assert_eq!(hub.join_group(&a.id, 7).await, JoinOutcome::Joined);
        assert!(hub
            .connection_rooms(&a.id)
            .contains(&RoomName::study_group(7)));

        assert_eq!(hub.join_group(&b.id, 7).await, JoinOutcome::Denied);
        assert_eq!(hub.connection_rooms(&b.id), b_rooms_before);
    }

    #[tokio::test]
    async fn test_join_requires_approved_live_membership() {
        let (hub, store) = hub_with_store();
        store.upsert_membership(Membership {
            group_id: 1,
            user_id: user("pending"),
            is_approved: false,
            is_deleted: false,
        });
        store.upsert_membership(Membership {
            group_id: 1,
            user_id: user("removed"),
            is_approved: true,
            is_deleted: true,
        });

        let pending = hub.on_connected(identified("pending"));
        let removed = hub.on_connected(identified("removed"));
        let anonymous = hub.on_connected(Identity::Anonymous);

        assert_eq!(hub.join_group(&pending.id, 1).await, JoinOutcome::Denied);
        assert_eq!(hub.join_group(&removed.id, 1).await, JoinOutcome::Denied);
        assert_eq!(hub.join_group(&anonymous.id, 1).await, JoinOutcome::Denied);
        assert!(!hub.router().room_exists(&RoomName::study_group(1)));
    }

    #[tokio::test]
    async fn test_join_twice_is_idempotent() {
        let (hub, store) = hub_with_store();
        store.approve(3, &user("alice"));
        let conn = hub.on_connected(identified("alice"));

        assert_eq!(hub.join_group(&conn.id, 3).await, JoinOutcome::Joined);
        assert_eq!(hub.join_group(&conn.id, 3).await, JoinOutcome::AlreadyJoined);
        assert_eq!(hub.router().subscriber_count(&RoomName::study_group(3)), 1);
    }

    #[tokio::test]
    async fn test_lookup_failure_is_swallowed() {
        let hub = Hub::new(Arc::new(FailingStore));
        let conn = hub.on_connected(identified("alice"));
        let before = hub.connection_rooms(&conn.id);

        assert_eq!(hub.join_group(&conn.id, 9).await, JoinOutcome::Failed);
        assert_eq!(hub.connection_rooms(&conn.id), before);
    }

    #[tokio::test]
    async fn test_join_on_unknown_connection_fails_quietly() {
        let (hub, store) = hub_with_store();
        store.approve(1, &user("alice"));
        assert_eq!(
            hub.join_group(&ConnectionId::new("conn_gone"), 1).await,
            JoinOutcome::Failed
        );
    }

    #[tokio::test]
    async fn test_revoked_membership_keeps_room_until_leave() {
        let (hub, store) = hub_with_store();
        store.approve(5, &user("alice"));
        store.approve(5, &user("bob"));
        let mut alice = hub.on_connected(identified("alice"));
        let bob = hub.on_connected(identified("bob"));
        hub.join_group(&alice.id, 5).await;
        hub.join_group(&bob.id, 5).await;

        store.revoke(5, &user("alice"));
        hub.send_group_message(&bob.id, 5, "still here?");
        let msg = next(&mut alice).await;
        assert_eq!(msg.event, events::RECEIVE_GROUP_MESSAGE);

        hub.leave_group(&alice.id, 5);
        assert!(!hub
            .connection_rooms(&alice.id)
            .contains(&RoomName::study_group(5)));
        hub.send_group_message(&bob.id, 5, "gone");
        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn test_leave_without_join_is_noop() {
        let (hub, _) = hub_with_store();
        let conn = hub.on_connected(identified("alice"));
        hub.leave_group(&conn.id, 42);
        assert_eq!(hub.connection_rooms(&conn.id).len(), 1);
    }

    #[tokio::test]
    async fn test_direct_message_reaches_receiver_and_sender_rooms() {
        let (hub, _) = hub_with_store();
        let a = hub.on_connected(identified("A"));
        let mut a_other_tab = hub.on_connected(identified("A"));
        let mut c = hub.on_connected(identified("C"));
        let mut bystander = hub.on_connected(identified("D"));

        let fan_out = hub.send_direct_message(&a.id, &user("C"), "hi");
        assert_eq!(
            fan_out.rooms,
            vec![RoomName::user(&user("C")), RoomName::user(&user("A"))]
        );
        assert_eq!(fan_out.receivers, 3);

        let to_c = next(&mut c).await;
        assert_eq!(to_c.room, RoomName::user(&user("C")));
        assert_eq!(&to_c.payload[..], b"hi");
        assert_eq!(to_c.event, events::RECEIVE_MESSAGE);

        let echo = next(&mut a_other_tab).await;
        assert_eq!(echo.room, RoomName::user(&user("A")));
        assert_eq!(&echo.payload[..], b"hi");

        assert_silent(&mut bystander).await;
    }

    #[tokio::test]
    async fn test_direct_message_to_offline_user_is_fire_and_forget() {
        let (hub, _) = hub_with_store();
        let a = hub.on_connected(identified("A"));

        let fan_out = hub.send_direct_message(&a.id, &user("nobody"), "hello?");
        assert_eq!(fan_out.rooms.len(), 2);
        assert_eq!(fan_out.receivers, 1);
    }

    #[tokio::test]
    async fn test_message_to_self_is_published_once() {
        let (hub, _) = hub_with_store();
        let mut a = hub.on_connected(identified("A"));

        let fan_out = hub.send_direct_message(&a.id, &user("A"), "note to self");
        assert_eq!(fan_out.rooms, vec![RoomName::user(&user("A"))]);
        next(&mut a).await;
        assert_silent(&mut a).await;
    }

    #[tokio::test]
    async fn test_anonymous_sender_is_dropped() {
        let (hub, _) = hub_with_store();
        let anon = hub.on_connected(Identity::Anonymous);
        let mut c = hub.on_connected(identified("C"));

        assert!(hub.send_direct_message(&anon.id, &user("C"), "spoof").is_dropped());
        assert_silent(&mut c).await;
    }

    #[tokio::test]
    async fn test_read_receipt_goes_to_sender_room_only() {
        let (hub, _) = hub_with_store();
        let mut sender = hub.on_connected(identified("S"));
        let mut reader = hub.on_connected(identified("R"));

        assert_eq!(hub.notify_message_read(&user("S"), 42), 1);

        let receipt = next(&mut sender).await;
        assert_eq!(receipt.event, events::MESSAGE_READ);
        assert_eq!(receipt.room, RoomName::user(&user("S")));
        let body: serde_json::Value = serde_json::from_slice(&receipt.payload).unwrap();
        assert_eq!(body["messageId"], 42);

        assert_silent(&mut reader).await;
    }

    #[tokio::test]
    async fn test_group_message_requires_room() {
        let (hub, store) = hub_with_store();
        store.approve(2, &user("alice"));
        let mut alice = hub.on_connected(identified("alice"));
        let outsider = hub.on_connected(identified("mallory"));

        hub.join_group(&alice.id, 2).await;
        assert!(hub.send_group_message(&outsider.id, 2, "hi all").is_dropped());
        assert_silent(&mut alice).await;

        let fan_out = hub.send_group_message(&alice.id, 2, "welcome");
        assert_eq!(fan_out.receivers, 1);
        assert_eq!(&next(&mut alice).await.payload[..], b"welcome");
    }
}
