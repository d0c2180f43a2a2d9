//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use duet_shared::constants::{
    DEFAULT_CLIENT_ORIGIN, DEFAULT_DELIVERY_BUFFER, DEFAULT_HTTP_PORT, MAX_CONTENT_LEN,
};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP + WebSocket server.
    /// Env: `HTTP_ADDR`, or `PORT` to change only the port.
    /// Default: `0.0.0.0:5000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `None` (platform data directory).
    pub database_path: Option<PathBuf>,

    /// Browser origin allowed by CORS; `*` allows any origin.
    /// Env: `CORS_ORIGIN`
    /// Default: `http://localhost:5173`
    pub cors_origin: String,

    /// Outbound queue capacity per live connection.
    /// Env: `DELIVERY_BUFFER`
    /// Default: `256`
    pub delivery_buffer: usize,

    /// Longest accepted message content, in characters.
    /// Env: `MAX_CONTENT_LEN`
    /// Default: `4096`
    pub max_content_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: None,
            cors_origin: DEFAULT_CLIENT_ORIGIN.to_string(),
            delivery_buffer: DEFAULT_DELIVERY_BUFFER,
            max_content_len: MAX_CONTENT_LEN,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(port) = var("PORT") {
            match port.trim().parse::<u16>() {
                Ok(port) => config.http_addr.set_port(port),
                Err(_) => tracing::warn!(value = %port, "Invalid PORT, ignoring"),
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(origin) = var("CORS_ORIGIN") {
            if !origin.is_empty() {
                config.cors_origin = origin;
            }
        }

        if let Some(val) = var("DELIVERY_BUFFER") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.delivery_buffer = n,
                _ => tracing::warn!(value = %val, "Invalid DELIVERY_BUFFER, using default"),
            }
        }

        if let Some(val) = var("MAX_CONTENT_LEN") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_content_len = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_CONTENT_LEN, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
