//! Wire protocol definitions for SyncClip peer links
//!
//! One JSON object travels per frame:
//!
//! ```json
//! {"origin": "<hub id>", "is_image": false, "content": "aGVsbG8="}
//! ```
//!
//! `content` is base64 (standard alphabet), the usual JSON encoding of a byte
//! array.

use crate::clipboard::ContentKind;
use crate::transport::{Result, TransportError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A clipboard update as it propagates through the mesh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncMessage {
    /// Identity of the hub that first produced this update
    pub origin: String,

    /// Content kind
    pub kind: ContentKind,

    /// Raw clipboard payload
    pub content: Bytes,
}

/// JSON shape of a frame
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    origin: String,
    is_image: bool,
    #[serde(default)]
    content: String,
}

impl SyncMessage {
    pub fn new(origin: impl Into<String>, kind: ContentKind, content: impl Into<Bytes>) -> Self {
        Self {
            origin: origin.into(),
            kind,
            content: content.into(),
        }
    }

    /// Serialize into one wire frame
    pub fn to_frame(&self) -> Result<Vec<u8>> {
        let wire = WireMessage {
            origin: self.origin.clone(),
            is_image: self.kind.is_image(),
            content: BASE64.encode(&self.content),
        };
        Ok(serde_json::to_vec(&wire)?)
    }

    /// Parse one wire frame
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        let wire: WireMessage = serde_json::from_slice(frame)?;
        let content = BASE64
            .decode(wire.content.as_bytes())
            .map_err(|e| TransportError::Encoding(e.to_string()))?;

        Ok(Self {
            origin: wire.origin,
            kind: ContentKind::from_is_image(wire.is_image),
            content: Bytes::from(content),
        })
    }
}
