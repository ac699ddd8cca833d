//! # SyncClip
//!
//! Peer-to-peer clipboard synchronization for a small mesh of devices.
//!
//! Every device runs a hub. The hub watches the local clipboard, pushes
//! changes to every connected peer and applies what peers send it, relaying
//! each update onward exactly once.

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod server;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use sync::{ContentGuard, Hub};

/// Result type alias for SyncClip operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for SyncClip operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// Hub error
    #[error("Hub error: {0}")]
    Hub(#[from] sync::HubError),

    /// HTTP/websocket server error
    #[error("Server error: {0}")]
    Server(#[from] server::ServerError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum payload accepted on the wire and over HTTP (32MB)
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;
