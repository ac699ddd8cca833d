//! Network transport layer for peer links
//!
//! A link is a persistent bidirectional frame channel to one peer. Links are
//! split into a reader half and a writer half so the two pumps of a peer
//! connection can run concurrently.

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod protocol;
pub mod websocket;

pub use protocol::SyncMessage;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// WebSocket protocol error
    #[error("Network connection error: {message}")]
    WebSocket { message: String },

    /// Connection error
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// Message serialization/deserialization error
    #[error("Data format error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Payload encoding error
    #[error("Payload encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("System error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Receiving half of a link
#[async_trait]
pub trait FrameReader: Send {
    /// Wait for the next data frame.
    ///
    /// Returns `ConnectionClosed` once the peer has gone away.
    async fn read_frame(&mut self) -> Result<Vec<u8>>;
}

/// Sending half of a link
#[async_trait]
pub trait FrameWriter: Send {
    /// Send one data frame
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<()>;

    /// Close the link gracefully
    async fn close(&mut self) -> Result<()>;
}

/// An established link to a peer, inbound or outbound
pub struct Link {
    pub reader: Box<dyn FrameReader>,
    pub writer: Box<dyn FrameWriter>,
    /// Remote address, for logs and peer listings
    pub remote: String,
}

impl Link {
    pub fn new(
        reader: impl FrameReader + 'static,
        writer: impl FrameWriter + 'static,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            remote: remote.into(),
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link").field("remote", &self.remote).finish()
    }
}

/// Something that can establish outbound links
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, address: &str) -> Result<Link>;
}
