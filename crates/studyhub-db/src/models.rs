//! Database row types, mapped to the core models at the store boundary.

use chrono::{DateTime, SecondsFormat, Utc};
use studyhub_core::{DirectMessage, Membership, StoreError, UserId};

pub struct MembershipRow {
    pub group_id: i64,
    pub user_id: String,
    pub is_approved: bool,
    pub is_deleted: bool,
}

pub struct DirectMessageRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub sent_at: String,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Membership {
            group_id: row.group_id,
            user_id: UserId::new(row.user_id),
            is_approved: row.is_approved,
            is_deleted: row.is_deleted,
        }
    }
}

impl TryFrom<DirectMessageRow> for DirectMessage {
    type Error = StoreError;

    fn try_from(row: DirectMessageRow) -> Result<Self, Self::Error> {
        Ok(DirectMessage {
            id: row.id,
            sender_id: UserId::new(row.sender_id),
            receiver_id: UserId::new(row.receiver_id),
            content: row.content,
            sent_at: parse_timestamp(&row.sent_at)?,
            is_read: row.is_read,
            read_at: row.read_at.as_deref().map(parse_timestamp).transpose()?,
            is_deleted: row.is_deleted,
            deleted_at: row.deleted_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// Timestamps are stored as fixed-width RFC 3339 text so they sort correctly.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {raw:?}: {e}")))
}
