//! Request/response access to a conversation transcript.

use tracing::debug;

use duet_shared::types::{Message, UserId};
use duet_store::StoreError;

use crate::store::MessageStore;

/// Stateless read path over [`MessageStore::fetch_conversation`].
#[derive(Clone)]
pub struct HistoryService {
    store: MessageStore,
}

impl HistoryService {
    pub fn new(store: MessageStore) -> Self {
        Self { store }
    }

    /// Full transcript between the two users, oldest first.
    ///
    /// An empty pair yields an empty vector; storage failures are returned
    /// as-is, never replaced by partial data.
    pub async fn get_conversation(
        &self,
        user_id: UserId,
        other_user_id: UserId,
    ) -> Result<Vec<Message>, StoreError> {
        let messages = self
            .store
            .fetch_conversation(user_id, other_user_id)
            .await?;

        debug_assert!(messages
            .iter()
            .all(|m| m.is_between(user_id, other_user_id)));

        debug!(
            user_id = %user_id,
            other_user_id = %other_user_id,
            count = messages.len(),
            "Served conversation history"
        );

        Ok(messages)
    }
}
