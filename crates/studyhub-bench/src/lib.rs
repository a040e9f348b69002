//! Fixtures shared by the StudyHub benchmarks.

use std::sync::Arc;
use studyhub_core::{ConnectionId, Hub, MemoryStore, Router, RoomName, UserId};

/// Connection id `conn-{i}`.
#[must_use]
pub fn connection(i: usize) -> ConnectionId {
    ConnectionId::new(format!("conn-{i}"))
}

/// User id `user-{i}`.
#[must_use]
pub fn user(i: usize) -> UserId {
    UserId::new(format!("user-{i}"))
}

/// A router with `rooms` study group rooms of `per_room` connections each.
#[must_use]
pub fn populated_router(rooms: usize, per_room: usize) -> Router {
    let router = Router::new();
    for group in 0..rooms {
        let room = RoomName::study_group(group as i64);
        for j in 0..per_room {
            let _ = router.subscribe(&connection(group * per_room + j), &room);
        }
    }
    router
}

/// A hub over an empty membership store where `members` users are approved
/// in group 1.
#[must_use]
pub fn hub_with_group(members: usize) -> (Hub, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    for i in 0..members {
        store.approve(1, &user(i));
    }
    (Hub::new(store.clone()), store)
}
