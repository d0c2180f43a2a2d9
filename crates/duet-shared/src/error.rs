use thiserror::Error;

/// Errors raised while decoding data that crossed the wire.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("Malformed event: {0}")]
    Json(#[from] serde_json::Error),
}
