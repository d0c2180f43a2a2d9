//! Persist-then-fan-out for new messages.
//!
//! Per send request: `Received -> Persisted -> Delivered`, or
//! `Received -> Failed`. The record delivered to both participants is the
//! one read back from the store, never the client's draft, so every
//! connected device converges on the same copy. The sender's echo doubles
//! as its delivery confirmation; there is no separate acknowledgement.

use tracing::{debug, info, warn};

use duet_shared::protocol::{SendRequest, ServerEvent};
use duet_shared::types::Message;

use crate::error::RelayError;
use crate::registry::ChannelRegistry;
use crate::store::MessageStore;

/// Result of a send that reached `Delivered`.
#[derive(Debug, Clone)]
pub struct Dispatch {
    /// The canonical record as read back from the store.
    pub message: Message,
    /// Live connections of the receiver that were handed the record.
    /// Zero is a delivery gap: the message is only reachable via history.
    pub receiver_reached: usize,
    /// Live connections of the sender that were handed the echo.
    pub sender_reached: usize,
}

pub struct RelayDispatcher {
    store: MessageStore,
    registry: ChannelRegistry,
    max_content_len: usize,
}

impl RelayDispatcher {
    pub fn new(store: MessageStore, registry: ChannelRegistry, max_content_len: usize) -> Self {
        Self {
            store,
            registry,
            max_content_len,
        }
    }

    pub async fn send(&self, request: SendRequest) -> Result<Dispatch, RelayError> {
        let SendRequest {
            sender_id,
            receiver_id,
            content,
        } = request;

        debug!(sender = %sender_id, receiver = %receiver_id, "Send received");

        self.validate(&content)?;

        let stored = self
            .store
            .append(sender_id, receiver_id, content)
            .await
            .map_err(|e| {
                warn!(sender = %sender_id, receiver = %receiver_id, error = %e, "Send failed: append");
                RelayError::Storage(e)
            })?;

        debug!(message_id = %stored.id, "Message persisted");

        let message = self.store.fetch_by_id(stored.id).await.map_err(|e| {
            // Persisted but unreadable: the row exists and will show up in
            // history, but nobody receives it live.
            warn!(message_id = %stored.id, error = %e, "Send failed: read-back");
            match e {
                duet_store::StoreError::NotFound => RelayError::NotFound(stored.id),
                other => RelayError::Storage(other),
            }
        })?;

        let event = ServerEvent::ReceiveMessage(message.clone());
        let receiver_reached = self.registry.deliver(receiver_id, &event).await;
        // A note to self would otherwise reach the same connections twice.
        let sender_reached = if sender_id == receiver_id {
            receiver_reached
        } else {
            self.registry.deliver(sender_id, &event).await
        };

        if receiver_reached == 0 {
            debug!(
                message_id = %message.id,
                receiver = %receiver_id,
                "Receiver offline, message available via history only"
            );
        }

        info!(
            message_id = %message.id,
            sender = %sender_id,
            receiver = %receiver_id,
            receiver_reached,
            sender_reached,
            "Message delivered"
        );

        Ok(Dispatch {
            message,
            receiver_reached,
            sender_reached,
        })
    }

    fn validate(&self, content: &str) -> Result<(), RelayError> {
        if content.trim().is_empty() {
            return Err(RelayError::InvalidMessage(
                "Message content must not be empty".into(),
            ));
        }

        let len = content.chars().count();
        if len > self.max_content_len {
            return Err(RelayError::InvalidMessage(format!(
                "Message content is {len} characters (max {})",
                self.max_content_len
            )));
        }

        Ok(())
    }
}
