//! One WebSocket connection: decode inbound events, hand them to the
//! registry or dispatcher, and write queued deliveries back out.
//!
//! The socket is split so that a writer task owns the sink and drains this
//! connection's outbound queue while the reader loop processes frames. Sends
//! are handled inline, so one connection's messages are persisted in the
//! order it issued them.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use duet_shared::protocol::{ClientEvent, ErrorCode, JoinedAck, ServerEvent};
use duet_shared::types::ConnectionId;

use crate::api::AppState;

pub async fn run_session(socket: WebSocket, state: AppState) {
    let connection = ConnectionId::new();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<ServerEvent>(state.config.delivery_buffer.max(1));

    info!(connection = %connection, "Client connected");

    let writer = tokio::spawn(writer_task(ws_sender, rx, connection));

    loop {
        match ws_receiver.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                handle_text(&text, &state, connection, &tx).await;
            }
            Some(Ok(WsMessage::Binary(_))) => {
                debug!(connection = %connection, "Ignoring binary frame");
            }
            Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
            Some(Ok(WsMessage::Close(frame))) => {
                info!(connection = %connection, reason = ?frame, "Client initiated close");
                break;
            }
            Some(Err(e)) => {
                warn!(connection = %connection, error = %e, "WebSocket receive error");
                break;
            }
            None => break,
        }
    }

    state.registry.leave(connection).await;
    writer.abort();

    info!(connection = %connection, "Client disconnected");
}

async fn handle_text(
    text: &str,
    state: &AppState,
    connection: ConnectionId,
    tx: &mpsc::Sender<ServerEvent>,
) {
    let event = match ClientEvent::from_json(text) {
        Ok(event) => event,
        Err(e) => {
            debug!(connection = %connection, error = %e, "Malformed client event");
            reply(tx, ServerEvent::error(ErrorCode::BadRequest, e.to_string())).await;
            return;
        }
    };

    match event {
        ClientEvent::Join(user_id) => {
            state.registry.join(user_id, connection, tx.clone()).await;
            reply(tx, ServerEvent::Joined(JoinedAck { user_id })).await;
        }
        ClientEvent::SendMessage(request) => {
            if let Err(e) = state.dispatcher.send(request).await {
                reply(tx, ServerEvent::error(e.code(), e.client_message())).await;
            }
        }
    }
}

/// Queue an event for this connection only.
async fn reply(tx: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    // Only fails once the writer is gone, i.e. the connection is closing.
    let _ = tx.send(event).await;
}

async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, WsMessage>,
    mut rx: mpsc::Receiver<ServerEvent>,
    connection: ConnectionId,
) {
    while let Some(event) = rx.recv().await {
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(connection = %connection, error = %e, "Failed to encode event");
                continue;
            }
        };

        if ws_sender.send(WsMessage::Text(text)).await.is_err() {
            debug!(connection = %connection, "WebSocket send failed, stopping writer");
            break;
        }
    }
}
