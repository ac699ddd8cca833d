//! Clipboard abstraction layer
//!
//! The hub only needs two operations from the operating system clipboard:
//! read the current payload of a kind and replace it. Everything else
//! (change detection, deduplication) is built on top of those.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use thiserror::Error;

pub mod system;
pub mod watcher;

pub use system::SystemClipboard;
pub use watcher::{watch_changes, ClipboardWatcher};

/// Kind of clipboard content that is synchronized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    /// UTF-8 text
    Text,
    /// PNG encoded image
    Image,
}

impl ContentKind {
    /// All kinds a hub tracks
    pub const ALL: [ContentKind; 2] = [ContentKind::Text, ContentKind::Image];

    /// Classify a kind from the wire flag
    pub fn from_is_image(is_image: bool) -> Self {
        if is_image {
            ContentKind::Image
        } else {
            ContentKind::Text
        }
    }

    /// Wire flag for this kind
    pub fn is_image(self) -> bool {
        self == ContentKind::Image
    }

    /// Classify a kind from an HTTP `Content-Type` header value
    pub fn from_content_type(content_type: &str) -> Self {
        Self::from_is_image(content_type.trim_start().starts_with("image/"))
    }

    /// MIME type used when serving this kind
    pub fn mime_type(self) -> &'static str {
        match self {
            ContentKind::Text => "text/plain",
            ContentKind::Image => "image/png",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Text => write!(f, "text"),
            ContentKind::Image => write!(f, "image"),
        }
    }
}

/// Clipboard errors
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Platform-specific error
    #[error("Platform error: {0}")]
    Platform(String),

    /// Image could not be converted
    #[error("Image conversion failed: {0}")]
    Image(String),

    /// Text payload is not valid UTF-8
    #[error("Clipboard text is not valid UTF-8")]
    InvalidText,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read/write access to a clipboard
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClipboardBackend: Send + Sync {
    /// Current payload of `kind`, `None` when the clipboard holds nothing of that kind
    async fn read(&self, kind: ContentKind) -> Result<Option<Bytes>, ClipboardError>;

    /// Replace the clipboard with `content` of `kind`
    async fn write(&self, kind: ContentKind, content: &[u8]) -> Result<(), ClipboardError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Process-local clipboard holding a single item.
///
/// Like a desktop clipboard, every write replaces whatever was there
/// before, whichever kind it was. Used by tests and by hubs running
/// without a desktop session.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    slot: Mutex<Option<(ContentKind, Bytes)>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous peek, handy in assertions
    pub fn get(&self, kind: ContentKind) -> Option<Bytes> {
        match &*self.slot.lock().unwrap_or_else(|e| e.into_inner()) {
            Some((held, content)) if *held == kind => Some(content.clone()),
            _ => None,
        }
    }

    /// Synchronous store, simulates the user copying something
    pub fn set(&self, kind: ContentKind, content: impl Into<Bytes>) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some((kind, content.into()));
    }
}

#[async_trait]
impl ClipboardBackend for MemoryClipboard {
    async fn read(&self, kind: ContentKind) -> Result<Option<Bytes>, ClipboardError> {
        Ok(self.get(kind))
    }

    async fn write(&self, kind: ContentKind, content: &[u8]) -> Result<(), ClipboardError> {
        self.set(kind, Bytes::copy_from_slice(content));
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("image/png", ContentKind::Image)]
    #[case("image/jpeg", ContentKind::Image)]
    #[case("text/plain; charset=utf-8", ContentKind::Text)]
    #[case("application/octet-stream", ContentKind::Text)]
    #[case("", ContentKind::Text)]
    fn test_kind_from_content_type(#[case] header: &str, #[case] expected: ContentKind) {
        assert_eq!(ContentKind::from_content_type(header), expected);
    }

    #[test]
    fn test_kind_wire_flag() {
        assert!(ContentKind::Image.is_image());
        assert!(!ContentKind::Text.is_image());
        assert_eq!(ContentKind::from_is_image(true), ContentKind::Image);
        assert_eq!(ContentKind::from_is_image(false), ContentKind::Text);
    }

    #[tokio::test]
    async fn test_memory_clipboard_reads_only_held_kind() {
        let clipboard = MemoryClipboard::new();
        assert!(clipboard.read(ContentKind::Text).await.unwrap().is_none());

        clipboard.write(ContentKind::Text, b"hello").await.unwrap();
        assert_eq!(
            clipboard.read(ContentKind::Text).await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert!(clipboard.read(ContentKind::Image).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_clipboard_write_replaces_other_kind() {
        let clipboard = MemoryClipboard::new();
        clipboard
            .write(ContentKind::Image, b"\x89PNGold")
            .await
            .unwrap();
        clipboard.write(ContentKind::Text, b"newer").await.unwrap();

        assert!(clipboard.read(ContentKind::Image).await.unwrap().is_none());
        assert_eq!(clipboard.get(ContentKind::Text), Some(Bytes::from_static(b"newer")));

        clipboard.set(ContentKind::Image, &b"\x89PNGnew"[..]);
        assert!(clipboard.get(ContentKind::Text).is_none());
    }
}
