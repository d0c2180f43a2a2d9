//! Append-only message log and the conversation query view.

use chrono::{DateTime, Utc};
use rusqlite::params;

use duet_shared::types::{Message, MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{format_ts, now_millis, parse_ts, StoredMessage};

/// Columns of a message joined with its sender's username.
const SELECT_WITH_SENDER: &str =
    "SELECT m.id, m.sender_id, m.receiver_id, m.content, m.created_at, u.username
     FROM messages m
     JOIN users u ON u.id = m.sender_id";

impl Database {
    /// Persist a new message. The store assigns the id and the timestamp.
    ///
    /// Timestamps never go backwards: a new row is stamped no earlier than
    /// the latest stored one, so id order and timestamp order agree even if
    /// the wall clock steps back.
    ///
    /// Fails with [`StoreError::Sqlite`] when the write is rejected, e.g. an
    /// unknown sender or receiver violates the foreign keys. The insert is a
    /// single statement, so either the full row exists afterwards or none.
    pub fn append_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
    ) -> Result<StoredMessage> {
        self.insert_message_at(sender_id, receiver_id, content, now_millis())
    }

    pub(crate) fn insert_message_at(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<StoredMessage> {
        let (id, stamped): (i64, String) = self.conn().query_row(
            "INSERT INTO messages (sender_id, receiver_id, content, created_at)
             VALUES (?1, ?2, ?3,
                     MAX(?4, COALESCE((SELECT MAX(created_at) FROM messages), ?4)))
             RETURNING id, created_at",
            params![sender_id.0, receiver_id.0, content, format_ts(&created_at)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StoredMessage {
            id: MessageId(id),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at: parse_ts(1, &stamped)?,
        })
    }

    /// Fetch one message enriched with the sender's username.
    pub fn get_message_by_id(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("{SELECT_WITH_SENDER} WHERE m.id = ?1"),
                params![id.0],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Every message exchanged between `user_a` and `user_b`, in either
    /// direction, oldest first. Equal timestamps are ordered by id.
    ///
    /// Returns an empty vector when the pair has no history.
    pub fn get_conversation(&self, user_a: UserId, user_b: UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_WITH_SENDER}
             WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
                OR (m.sender_id = ?2 AND m.receiver_id = ?1)
             ORDER BY m.created_at ASC, m.id ASC"
        ))?;

        let rows = stmt.query_map(params![user_a.0, user_b.0], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: i64 = row.get(0)?;
    let sender_id: i64 = row.get(1)?;
    let receiver_id: i64 = row.get(2)?;
    let content: String = row.get(3)?;
    let ts_str: String = row.get(4)?;
    let sender_name: String = row.get(5)?;

    Ok(Message {
        id: MessageId(id),
        content,
        created_at: parse_ts(4, &ts_str)?,
        sender_id: UserId(sender_id),
        receiver_id: UserId(receiver_id),
        sender_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Database,
        alice: UserId,
        bob: UserId,
        carol: UserId,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("messages.db")).unwrap();
        let alice = db.find_or_create_user("alice").unwrap().id;
        let bob = db.find_or_create_user("bob").unwrap().id;
        let carol = db.find_or_create_user("carol").unwrap().id;
        Fixture {
            _dir: dir,
            db,
            alice,
            bob,
            carol,
        }
    }

    fn ts(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    /// Insert with an exact timestamp, bypassing the monotonic stamping.
    fn insert_raw(db: &Database, from: UserId, to: UserId, content: &str, at: &str) -> MessageId {
        let id = db
            .conn()
            .query_row(
                "INSERT INTO messages (sender_id, receiver_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 RETURNING id",
                params![from.0, to.0, content, at],
                |row| row.get(0),
            )
            .unwrap();
        MessageId(id)
    }

    #[test]
    fn append_then_fetch_by_id_adds_sender_name() {
        let f = fixture();
        let stored = f.db.append_message(f.alice, f.bob, "hi").unwrap();
        let fetched = f.db.get_message_by_id(stored.id).unwrap();

        assert_eq!(fetched.id, stored.id);
        assert_eq!(fetched.content, "hi");
        assert_eq!(fetched.sender_id, f.alice);
        assert_eq!(fetched.receiver_id, f.bob);
        assert_eq!(fetched.created_at, stored.created_at);
        assert_eq!(fetched.sender_name, "alice");
    }

    #[test]
    fn ids_increase() {
        let f = fixture();
        let a = f.db.append_message(f.alice, f.bob, "1").unwrap();
        let b = f.db.append_message(f.bob, f.alice, "2").unwrap();
        assert!(b.id > a.id);
    }

    #[test]
    fn fetch_unknown_id_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.db.get_message_by_id(MessageId(4242)),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn unknown_participant_is_rejected_without_a_row() {
        let f = fixture();
        let ghost = UserId(9999);

        assert!(matches!(
            f.db.append_message(f.alice, ghost, "hello?"),
            Err(StoreError::Sqlite(_))
        ));
        assert!(matches!(
            f.db.append_message(ghost, f.alice, "boo"),
            Err(StoreError::Sqlite(_))
        ));

        let count: i64 = f
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn empty_conversation_is_empty_not_error() {
        let f = fixture();
        assert!(f.db.get_conversation(f.alice, f.bob).unwrap().is_empty());
    }

    #[test]
    fn conversation_covers_both_directions_only() {
        let f = fixture();
        f.db.append_message(f.alice, f.bob, "a->b").unwrap();
        f.db.append_message(f.bob, f.alice, "b->a").unwrap();
        f.db.append_message(f.alice, f.carol, "a->c").unwrap();
        f.db.append_message(f.carol, f.bob, "c->b").unwrap();

        let convo = f.db.get_conversation(f.alice, f.bob).unwrap();
        let contents: Vec<_> = convo.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["a->b", "b->a"]);
        assert!(convo.iter().all(|m| m.is_between(f.alice, f.bob)));

        let reversed = f.db.get_conversation(f.bob, f.alice).unwrap();
        assert_eq!(convo, reversed);
    }

    #[test]
    fn conversation_orders_by_timestamp_then_id() {
        let f = fixture();
        let late = insert_raw(&f.db, f.alice, f.bob, "late", "2024-03-01T12:00:00.500Z");
        let tie_first = insert_raw(&f.db, f.bob, f.alice, "tie-1", "2024-03-01T12:00:00.100Z");
        let tie_second = insert_raw(&f.db, f.alice, f.bob, "tie-2", "2024-03-01T12:00:00.100Z");
        let early = insert_raw(&f.db, f.alice, f.bob, "early", "2024-03-01T11:59:59.999Z");

        let ids: Vec<_> = f
            .db
            .get_conversation(f.alice, f.bob)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, [early, tie_first, tie_second, late]);

        // Stable across repeated reads.
        let again: Vec<_> = f
            .db
            .get_conversation(f.alice, f.bob)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn clock_stepping_back_keeps_persisted_order() {
        let f = fixture();
        let first = f
            .db
            .insert_message_at(f.alice, f.bob, "first", ts("2024-03-01T12:00:00.500Z"))
            .unwrap();
        let second = f
            .db
            .insert_message_at(f.bob, f.alice, "second", ts("2024-03-01T12:00:00.100Z"))
            .unwrap();
        let third = f
            .db
            .insert_message_at(f.alice, f.bob, "third", ts("2024-03-01T12:00:01.000Z"))
            .unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(third.created_at, ts("2024-03-01T12:00:01.000Z"));

        let convo = f.db.get_conversation(f.alice, f.bob).unwrap();
        let ids: Vec<_> = convo.iter().map(|m| m.id).collect();
        assert_eq!(ids, [first.id, second.id, third.id]);
        assert_eq!(convo[1].created_at, second.created_at);
    }

    #[test]
    fn conversation_returns_rows_as_persisted() {
        let f = fixture();
        let contents = ["  padded  ", "emoji 🎉", "line\nbreak", "quote ' \" ;"];
        let mut stored = Vec::new();
        for (i, content) in contents.iter().enumerate() {
            let (from, to) = if i % 2 == 0 { (f.alice, f.bob) } else { (f.bob, f.alice) };
            stored.push(f.db.append_message(from, to, content).unwrap());
        }

        let convo = f.db.get_conversation(f.alice, f.bob).unwrap();
        assert_eq!(convo.len(), stored.len());
        for (read, written) in convo.iter().zip(&stored) {
            assert_eq!(read.id, written.id);
            assert_eq!(read.content, written.content);
            assert_eq!(read.sender_id, written.sender_id);
            assert_eq!(read.receiver_id, written.receiver_id);
            assert_eq!(read.created_at, written.created_at);
        }
        assert_eq!(convo[1].sender_name, "bob");
    }
}
