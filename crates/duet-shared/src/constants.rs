/// Application name
pub const APP_NAME: &str = "Duet";

/// Default HTTP / WebSocket listen port (server)
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Browser origin of the bundled web client during development
pub const DEFAULT_CLIENT_ORIGIN: &str = "http://localhost:5173";

/// Maximum message content length, in characters
pub const MAX_CONTENT_LEN: usize = 4096;

/// Per-connection outbound queue capacity
pub const DEFAULT_DELIVERY_BUFFER: usize = 256;

/// Sender display name used when a producer omits it
pub const UNKNOWN_SENDER_NAME: &str = "Unknown";
