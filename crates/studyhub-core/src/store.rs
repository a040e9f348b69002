//! Persistence boundary of the hub.
//!
//! The hub only reads memberships. Direct messages are written by the
//! caller of the fan-out, before it fans out; the two steps are not atomic.

use crate::identity::{GroupId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

/// Maximum length of a direct message body, in characters.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed (I/O, SQL, poisoned lock...).
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A row could not be mapped to its model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Membership of a user in a study group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub is_approved: bool,
    pub is_deleted: bool,
}

impl Membership {
    /// Whether this membership admits its user to the group's room.
    #[must_use]
    pub fn admits(&self) -> bool {
        self.is_approved && !self.is_deleted
    }
}

/// A persisted direct message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: i64,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    /// Soft-delete fields; present on the row, never written by the hub.
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A direct message about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDirectMessage {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Why a message body was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("message content is empty")]
    Empty,
    #[error("message content exceeds {limit} characters")]
    TooLong { limit: usize },
}

impl NewDirectMessage {
    /// Build a message stamped with the current time.
    ///
    /// The body is trimmed and must hold 1..=`max_length` characters.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError`] when the trimmed body is empty or too long.
    pub fn new(
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
        max_length: usize,
    ) -> Result<Self, ContentError> {
        let content = validate_content(content, max_length)?;
        Ok(Self {
            sender_id,
            receiver_id,
            content: content.to_string(),
            sent_at: Utc::now(),
        })
    }
}

/// Trim a chat body and check it holds 1..=`max_length` characters.
///
/// # Errors
///
/// Returns [`ContentError`] when the trimmed body is empty or too long.
pub fn validate_content(content: &str, max_length: usize) -> Result<&str, ContentError> {
    let content = content.trim();
    if content.is_empty() {
        return Err(ContentError::Empty);
    }
    if content.chars().count() > max_length {
        return Err(ContentError::TooLong { limit: max_length });
    }
    Ok(content)
}

/// Outcome of [`DirectMessageStore::mark_read`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReadMark {
    /// The row after the call.
    pub message: DirectMessage,
    /// Whether this call flipped the read flag. At most one call per message
    /// ever sees `true`.
    pub newly_read: bool,
}

/// Membership lookups used by the group room gate.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Find the membership row of `user_id` in `group_id`, if any.
    async fn find_membership(
        &self,
        group_id: GroupId,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError>;
}

/// Direct message persistence.
#[async_trait]
pub trait DirectMessageStore: Send + Sync {
    async fn insert_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<DirectMessage, StoreError>;

    async fn get_direct_message(&self, id: i64) -> Result<Option<DirectMessage>, StoreError>;

    /// Set the read flag. The first read timestamp is kept on repeated calls.
    ///
    /// Returns the row and whether this call did the flip, or `None` if the
    /// row does not exist. The flip is decided atomically by the store.
    async fn mark_read(&self, id: i64, at: DateTime<Utc>) -> Result<Option<ReadMark>, StoreError>;

    /// The latest `limit` messages exchanged between two users, oldest first.
    async fn conversation(
        &self,
        a: &UserId,
        b: &UserId,
        limit: usize,
    ) -> Result<Vec<DirectMessage>, StoreError>;
}

/// In-process store backed by `DashMap`s.
#[derive(Debug, Default)]
pub struct MemoryStore {
    memberships: DashMap<(GroupId, UserId), Membership>,
    messages: DashMap<i64, DirectMessage>,
    next_id: AtomicI64,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a membership row.
    pub fn upsert_membership(&self, membership: Membership) {
        self.memberships.insert(
            (membership.group_id, membership.user_id.clone()),
            membership,
        );
    }

    /// Shorthand for an approved, live membership.
    pub fn approve(&self, group_id: GroupId, user_id: &UserId) {
        self.upsert_membership(Membership {
            group_id,
            user_id: user_id.clone(),
            is_approved: true,
            is_deleted: false,
        });
    }

    /// Revoke approval of an existing membership.
    pub fn revoke(&self, group_id: GroupId, user_id: &UserId) {
        if let Some(mut row) = self.memberships.get_mut(&(group_id, user_id.clone())) {
            row.is_approved = false;
        }
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn find_membership(
        &self,
        group_id: GroupId,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        Ok(self
            .memberships
            .get(&(group_id, user_id.clone()))
            .map(|row| row.clone()))
    }
}

#[async_trait]
impl DirectMessageStore for MemoryStore {
    async fn insert_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<DirectMessage, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let row = DirectMessage {
            id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            sent_at: message.sent_at,
            is_read: false,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
        };
        self.messages.insert(id, row.clone());
        Ok(row)
    }

    async fn get_direct_message(&self, id: i64) -> Result<Option<DirectMessage>, StoreError> {
        Ok(self.messages.get(&id).map(|row| row.clone()))
    }

    async fn mark_read(&self, id: i64, at: DateTime<Utc>) -> Result<Option<ReadMark>, StoreError> {
        Ok(self.messages.get_mut(&id).map(|mut row| {
            let newly_read = !row.is_read;
            if newly_read {
                row.is_read = true;
                row.read_at = Some(at);
            }
            ReadMark {
                message: row.clone(),
                newly_read,
            }
        }))
    }

    async fn conversation(
        &self,
        a: &UserId,
        b: &UserId,
        limit: usize,
    ) -> Result<Vec<DirectMessage>, StoreError> {
        let mut rows: Vec<DirectMessage> = self
            .messages
            .iter()
            .filter(|row| {
                (&row.sender_id == a && &row.receiver_id == b)
                    || (&row.sender_id == b && &row.receiver_id == a)
            })
            .map(|row| row.clone())
            .collect();
        rows.sort_by_key(|row| (row.sent_at, row.id));
        let skip = rows.len().saturating_sub(limit);
        Ok(rows.split_off(skip))
    }
}
