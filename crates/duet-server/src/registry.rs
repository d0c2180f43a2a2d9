//! Live delivery channels: which connections currently represent each user.
//!
//! A user may be bound to several connections at once (several devices or
//! tabs); a connection is bound to at most one user. Delivery is best-effort:
//! nothing is queued for a user with no live connection, and a connection
//! whose outbound queue is full or closed simply misses the payload.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use duet_shared::protocol::ServerEvent;
use duet_shared::types::{ConnectionId, UserId};

/// Sender half of a connection's outbound queue.
pub type DeliveryTx = mpsc::Sender<ServerEvent>;

#[derive(Default)]
struct Channels {
    /// user -> live connections bound to that user
    by_user: HashMap<UserId, HashMap<ConnectionId, DeliveryTx>>,
    /// connection -> the user it is bound to
    by_connection: HashMap<ConnectionId, UserId>,
}

impl Channels {
    fn unbind(&mut self, connection: ConnectionId) -> Option<UserId> {
        let user_id = self.by_connection.remove(&connection)?;
        if let Some(conns) = self.by_user.get_mut(&user_id) {
            conns.remove(&connection);
            if conns.is_empty() {
                self.by_user.remove(&user_id);
            }
        }
        Some(user_id)
    }
}

/// Concurrency-safe map of `UserId -> set of live connections`.
///
/// Join and leave take the write lock; deliver takes the read lock and only
/// enqueues, so a join that completes before a deliver is always observed by
/// it.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: Arc<RwLock<Channels>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` to `user_id`'s channel.
    ///
    /// Joining again with the same user is a no-op. Joining with a different
    /// user moves the connection.
    pub async fn join(&self, user_id: UserId, connection: ConnectionId, tx: DeliveryTx) {
        let mut channels = self.channels.write().await;

        match channels.by_connection.get(&connection).copied() {
            Some(bound) if bound == user_id => return,
            Some(_) => {
                channels.unbind(connection);
            }
            None => {}
        }

        channels.by_connection.insert(connection, user_id);
        let conns = channels.by_user.entry(user_id).or_default();
        conns.insert(connection, tx);

        info!(
            user_id = %user_id,
            connection = %connection,
            connections = conns.len(),
            "Connection joined channel"
        );
    }

    /// Remove `connection` from whichever channel holds it.
    ///
    /// Returns the user it was bound to; `None` if it was never bound.
    pub async fn leave(&self, connection: ConnectionId) -> Option<UserId> {
        let user_id = self.channels.write().await.unbind(connection)?;

        info!(
            user_id = %user_id,
            connection = %connection,
            "Connection left channel"
        );

        Some(user_id)
    }

    /// Push `event` to every connection bound to `user_id`.
    ///
    /// Returns how many connections accepted it. Zero means the user had no
    /// live channel; the payload is dropped, not queued.
    pub async fn deliver(&self, user_id: UserId, event: &ServerEvent) -> usize {
        let channels = self.channels.read().await;

        let Some(conns) = channels.by_user.get(&user_id) else {
            debug!(user_id = %user_id, "No live channel, delivery skipped");
            return 0;
        };

        let mut delivered = 0;
        for (connection, tx) in conns {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        user_id = %user_id,
                        connection = %connection,
                        "Outbound queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(
                        user_id = %user_id,
                        connection = %connection,
                        "Connection closed before leave, dropping event"
                    );
                }
            }
        }

        delivered
    }

    /// Number of connections currently bound to `user_id`.
    pub async fn connection_count(&self, user_id: UserId) -> usize {
        self.channels
            .read()
            .await
            .by_user
            .get(&user_id)
            .map_or(0, HashMap::len)
    }

    /// Number of users with at least one live connection.
    pub async fn user_count(&self) -> usize {
        self.channels.read().await.by_user.len()
    }
}
