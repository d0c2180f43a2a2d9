//! JSON events exchanged over a client connection.
//!
//! Every frame is an object of the form `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{Message, UserId};

/// Events a client sends to the relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Bind this connection to a user's delivery channel.
    Join(UserId),

    /// Persist a message and fan it out to both participants.
    #[serde(alias = "send")]
    SendMessage(SendRequest),
}

/// Payload of a send event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(alias = "sender_id")]
    pub sender_id: UserId,
    #[serde(alias = "receiver_id")]
    pub receiver_id: UserId,
    pub content: String,
}

/// Events the relay pushes to a client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A canonical message for one of this connection's conversations.
    ReceiveMessage(Message),

    /// The connection is now bound to the given user's channel.
    Joined(JoinedAck),

    /// An operation issued on this connection failed.
    Error(ErrorPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinedAck {
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidMessage,
    StorageError,
    NotFound,
    BadRequest,
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ServerEvent {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEvent::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}
