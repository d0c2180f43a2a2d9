//! Async facade over the synchronous SQLite [`Database`].
//!
//! rusqlite is blocking, so the connection lives behind a mutex and every
//! call runs on tokio's blocking pool. One write at a time reaches SQLite;
//! messages need no cross-row locking beyond that.

use std::path::Path;
use std::sync::{Arc, Mutex};

use duet_shared::types::{Message, MessageId, UserId};
use duet_store::{Database, StoreError, StoredMessage, User};

#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Mutex<Database>>,
}

impl MessageStore {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Open the database at `path`, or at the platform default when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self, StoreError> {
        let db = match path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        Ok(Self::new(db))
    }

    async fn with_db<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, StoreError> + Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db.lock().map_err(|_| StoreError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
    }

    pub async fn append(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: String,
    ) -> Result<StoredMessage, StoreError> {
        self.with_db(move |db| db.append_message(sender_id, receiver_id, &content))
            .await
    }

    pub async fn fetch_by_id(&self, id: MessageId) -> Result<Message, StoreError> {
        self.with_db(move |db| db.get_message_by_id(id)).await
    }

    pub async fn fetch_conversation(
        &self,
        user_a: UserId,
        user_b: UserId,
    ) -> Result<Vec<Message>, StoreError> {
        self.with_db(move |db| db.get_conversation(user_a, user_b))
            .await
    }

    /// Login collaborator: existing or newly created user for `username`.
    pub async fn login(&self, username: String) -> Result<User, StoreError> {
        self.with_db(move |db| db.find_or_create_user(&username))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concurrent_appends_all_land() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::open(Some(&dir.path().join("store.db"))).unwrap();
        let alice = store.login("alice".into()).await.unwrap().id;
        let bob = store.login("bob".into()).await.unwrap().id;

        let mut tasks = Vec::new();
        for i in 0..20 {
            let store = store.clone();
            let (from, to) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
            tasks.push(tokio::spawn(async move {
                store.append(from, to, format!("msg {i}")).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let convo = store.fetch_conversation(alice, bob).await.unwrap();
        assert_eq!(convo.len(), 20);

        let mut ids: Vec<_> = convo.iter().map(|m| m.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn fetch_by_id_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::open(Some(&dir.path().join("store.db"))).unwrap();
        let alice = store.login("alice".into()).await.unwrap().id;
        let bob = store.login("bob".into()).await.unwrap().id;

        let stored = store.append(alice, bob, "hey".into()).await.unwrap();
        let fetched = store.fetch_by_id(stored.id).await.unwrap();
        assert_eq!(fetched.content, "hey");
        assert_eq!(fetched.sender_name, "alice");

        assert!(matches!(
            store.fetch_by_id(MessageId(stored.id.0 + 100)).await,
            Err(StoreError::NotFound)
        ));
    }
}
