//! # duet-shared
//!
//! Types shared by the Duet store and relay server: identifier newtypes,
//! the canonical [`Message`](types::Message) record, the JSON wire events
//! exchanged over a client connection, and protocol-level errors.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use types::{ConnectionId, Message, MessageId, UserId};
