use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use duet_shared::protocol::ErrorCode;
use duet_shared::types::MessageId;
use duet_store::StoreError;

/// Why a send request ended in `Failed` (or was rejected up front).
#[derive(Debug, Error)]
pub enum RelayError {
    /// Blank or oversized content; nothing was persisted or delivered.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The store was unreachable or rejected the write/read.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// The message was persisted but could not be read back.
    #[error("Message {0} was persisted but could not be read back")]
    NotFound(MessageId),
}

impl RelayError {
    /// Wire code reported to the sending connection.
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::InvalidMessage(_) => ErrorCode::InvalidMessage,
            RelayError::Storage(_) => ErrorCode::StorageError,
            RelayError::NotFound(_) => ErrorCode::NotFound,
        }
    }

    /// Text safe to show to a client. Storage details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::InvalidMessage(reason) => reason.clone(),
            RelayError::Storage(_) => "Database error".to_string(),
            RelayError::NotFound(_) => "Message could not be delivered".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidInput(reason) => ServerError::BadRequest(reason),
            StoreError::NotFound => ServerError::NotFound("Record not found".into()),
            other => ServerError::Storage(other),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Storage(e) => {
                tracing::error!(error = %e, "Storage failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
