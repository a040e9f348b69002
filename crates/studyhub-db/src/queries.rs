use crate::models::{format_timestamp, DirectMessageRow, MembershipRow};
use crate::{store_error, Database};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use studyhub_core::{
    DirectMessage, DirectMessageStore, GroupId, Membership, MembershipStore, NewDirectMessage,
    ReadMark, StoreError, UserId,
};

const DIRECT_MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, sent_at, is_read, read_at, is_deleted, deleted_at";

impl Database {
    // -- Memberships --

    /// Insert or update the membership of `user_id` in `group_id`.
    pub fn upsert_membership(
        &self,
        group_id: GroupId,
        user_id: &str,
        is_approved: bool,
        is_deleted: bool,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO study_group_members (group_id, user_id, is_approved, is_deleted)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (group_id, user_id)
                 DO UPDATE SET is_approved = excluded.is_approved, is_deleted = excluded.is_deleted",
                rusqlite::params![group_id, user_id, is_approved, is_deleted],
            )?;
            Ok(())
        })
    }

    pub fn get_membership(&self, group_id: GroupId, user_id: &str) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| query_membership(conn, group_id, user_id))
    }

    // -- Direct messages --

    pub fn insert_message(&self, message: &NewDirectMessage) -> Result<DirectMessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO direct_messages (sender_id, receiver_id, content, sent_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    message.sender_id.as_str(),
                    message.receiver_id.as_str(),
                    message.content,
                    format_timestamp(&message.sent_at),
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?
                .ok_or_else(|| anyhow::anyhow!("Inserted message {} not found", id))
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<DirectMessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Set the read flag once; later calls keep the first `read_at`.
    ///
    /// The flag is true only for the call whose update touched the row.
    pub fn mark_message_read(
        &self,
        id: i64,
        at: &DateTime<Utc>,
    ) -> Result<Option<(DirectMessageRow, bool)>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE direct_messages SET is_read = 1, read_at = ?2
                 WHERE id = ?1 AND is_read = 0",
                rusqlite::params![id, format_timestamp(at)],
            )?;
            Ok(query_message(conn, id)?.map(|row| (row, changed == 1)))
        })
    }

    /// Latest `limit` messages between two users, oldest first.
    pub fn get_conversation(&self, a: &str, b: &str, limit: usize) -> Result<Vec<DirectMessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {DIRECT_MESSAGE_COLUMNS} FROM direct_messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY sent_at DESC, id DESC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![a, b, limit as i64], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }
}

fn query_membership(conn: &Connection, group_id: GroupId, user_id: &str) -> Result<Option<MembershipRow>> {
    let mut stmt = conn.prepare(
        "SELECT group_id, user_id, is_approved, is_deleted
         FROM study_group_members WHERE group_id = ?1 AND user_id = ?2",
    )?;

    let row = stmt
        .query_row(rusqlite::params![group_id, user_id], |row| {
            Ok(MembershipRow {
                group_id: row.get(0)?,
                user_id: row.get(1)?,
                is_approved: row.get(2)?,
                is_deleted: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<DirectMessageRow>> {
    let sql = format!("SELECT {DIRECT_MESSAGE_COLUMNS} FROM direct_messages WHERE id = ?1");
    let row = conn.query_row(&sql, [id], map_message).optional()?;
    Ok(row)
}

fn map_message(row: &Row<'_>) -> rusqlite::Result<DirectMessageRow> {
    Ok(DirectMessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        content: row.get(3)?,
        sent_at: row.get(4)?,
        is_read: row.get(5)?,
        read_at: row.get(6)?,
        is_deleted: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

#[async_trait]
impl MembershipStore for Database {
    async fn find_membership(
        &self,
        group_id: GroupId,
        user_id: &UserId,
    ) -> Result<Option<Membership>, StoreError> {
        let row = self
            .get_membership(group_id, user_id.as_str())
            .map_err(store_error)?;
        Ok(row.map(Membership::from))
    }
}

#[async_trait]
impl DirectMessageStore for Database {
    async fn insert_direct_message(
        &self,
        message: NewDirectMessage,
    ) -> Result<DirectMessage, StoreError> {
        self.insert_message(&message)
            .map_err(store_error)?
            .try_into()
    }

    async fn get_direct_message(&self, id: i64) -> Result<Option<DirectMessage>, StoreError> {
        self.get_message(id)
            .map_err(store_error)?
            .map(DirectMessage::try_from)
            .transpose()
    }

    async fn mark_read(&self, id: i64, at: DateTime<Utc>) -> Result<Option<ReadMark>, StoreError> {
        self.mark_message_read(id, &at)
            .map_err(store_error)?
            .map(|(row, newly_read)| {
                Ok(ReadMark {
                    message: DirectMessage::try_from(row)?,
                    newly_read,
                })
            })
            .transpose()
    }

    async fn conversation(
        &self,
        a: &UserId,
        b: &UserId,
        limit: usize,
    ) -> Result<Vec<DirectMessage>, StoreError> {
        self.get_conversation(a.as_str(), b.as_str(), limit)
            .map_err(store_error)?
            .into_iter()
            .map(DirectMessage::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn new_message(from: &str, to: &str, content: &str) -> NewDirectMessage {
        NewDirectMessage::new(UserId::new(from), UserId::new(to), content, 1000).unwrap()
    }

    #[tokio::test]
    async fn test_membership_lookup() {
        let db = db();
        db.upsert_membership(7, "alice", true, false).unwrap();
        db.upsert_membership(7, "bob", false, false).unwrap();

        let alice = db.find_membership(7, &UserId::new("alice")).await.unwrap().unwrap();
        assert!(alice.admits());

        let bob = db.find_membership(7, &UserId::new("bob")).await.unwrap().unwrap();
        assert!(!bob.admits());

        assert!(db.find_membership(8, &UserId::new("alice")).await.unwrap().is_none());
        assert!(db.find_membership(7, &UserId::new("Alice")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_membership_soft_delete() {
        let db = db();
        db.upsert_membership(1, "carol", true, false).unwrap();
        db.upsert_membership(1, "carol", true, true).unwrap();

        let carol = db.find_membership(1, &UserId::new("carol")).await.unwrap().unwrap();
        assert!(carol.is_deleted);
        assert!(!carol.admits());
    }

    #[tokio::test]
    async fn test_insert_and_read_message() {
        let db = db();
        let sent = db
            .insert_direct_message(new_message("alice", "bob", "see you at 5"))
            .await
            .unwrap();

        assert!(sent.id > 0);
        assert!(!sent.is_read);
        assert!(!sent.is_deleted);

        let at = Utc::now();
        let read = db.mark_read(sent.id, at).await.unwrap().unwrap();
        assert!(read.newly_read);
        assert!(read.message.is_read);
        assert_eq!(
            read.message.read_at.map(|t| format_timestamp(&t)),
            Some(format_timestamp(&at))
        );

        let again = db
            .mark_read(sent.id, at + chrono::Duration::minutes(1))
            .await
            .unwrap()
            .unwrap();
        assert!(!again.newly_read);
        assert_eq!(again.message.read_at, read.message.read_at);

        assert!(db.mark_read(sent.id + 100, at).await.unwrap().is_none());
        assert!(db.get_direct_message(sent.id + 100).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mark_read_flips_once() {
        let db = std::sync::Arc::new(db());
        let sent = db
            .insert_direct_message(new_message("alice", "bob", "read me"))
            .await
            .unwrap();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                tokio::spawn(async move { db.mark_read(sent.id, Utc::now()).await })
            })
            .collect();

        let mut flips = 0;
        for task in tasks {
            if task.await.unwrap().unwrap().unwrap().newly_read {
                flips += 1;
            }
        }
        assert_eq!(flips, 1);
    }

    #[tokio::test]
    async fn test_conversation_window() {
        let db = db();
        for (from, to, text) in [
            ("alice", "bob", "one"),
            ("bob", "alice", "two"),
            ("alice", "carol", "elsewhere"),
            ("alice", "bob", "three"),
        ] {
            db.insert_direct_message(new_message(from, to, text)).await.unwrap();
        }

        let convo = db
            .conversation(&UserId::new("bob"), &UserId::new("alice"), 2)
            .await
            .unwrap();
        assert_eq!(
            convo.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["two", "three"]
        );
    }

    #[test]
    fn test_content_bound_enforced_by_schema() {
        let db = db();
        let oversized = NewDirectMessage {
            sender_id: UserId::new("a"),
            receiver_id: UserId::new("b"),
            content: "x".repeat(1001),
            sent_at: Utc::now(),
        };
        assert!(db.insert_message(&oversized).is_err());
    }
}
