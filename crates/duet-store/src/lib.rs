//! # duet-store
//!
//! Durable storage for the Duet relay, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection`. Users are created by the login path; messages are
//! append-only and are always read back joined with the sender's username.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
