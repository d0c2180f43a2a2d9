//! # duet-server
//!
//! Two-party chat relay. Clients log in by username over HTTP, open a
//! WebSocket, join their user channel, and send messages that are persisted
//! and then fanned out live to both participants.
//!
//! - [`registry`]: user id -> live connections
//! - [`dispatcher`]: persist, read back, deliver to receiver then sender
//! - [`history`]: ordered transcript for a pair of users
//! - [`session`]: one WebSocket connection at the edge
//! - [`api`]: axum router for login, history, health and the socket

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod registry;
pub mod session;
pub mod store;
