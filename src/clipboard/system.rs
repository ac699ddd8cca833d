//! Operating system clipboard backed by `arboard`
//!
//! Images cross the wire as PNG, while `arboard` deals in raw RGBA, so both
//! directions go through the `image` crate. Re-encoding is not byte-stable
//! across implementations, so the last PNG we applied is remembered and
//! handed back while the clipboard still holds its pixels.

use super::{ClipboardBackend, ClipboardError, ContentKind};
use arboard::{Clipboard, ImageData};
use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, RgbaImage};
use std::borrow::Cow;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// The last image written, as pixels and as the PNG it came from
#[derive(Debug)]
struct AppliedImage {
    width: usize,
    height: usize,
    rgba: Vec<u8>,
    png: Bytes,
}

impl AppliedImage {
    fn matches(&self, image: &ImageData<'_>) -> bool {
        self.width == image.width
            && self.height == image.height
            && self.rgba == image.bytes.as_ref()
    }
}

/// Desktop clipboard provider
#[derive(Debug, Default)]
pub struct SystemClipboard {
    applied: Arc<Mutex<Option<AppliedImage>>>,
}

impl SystemClipboard {
    /// Probe the desktop clipboard so startup fails early without one
    pub fn new() -> Result<Self, ClipboardError> {
        Clipboard::new().map_err(platform_error)?;
        Ok(Self::default())
    }
}

#[async_trait]
impl ClipboardBackend for SystemClipboard {
    async fn read(&self, kind: ContentKind) -> Result<Option<Bytes>, ClipboardError> {
        let applied = Arc::clone(&self.applied);
        tokio::task::spawn_blocking(move || read_blocking(kind, &applied))
            .await
            .map_err(|e| ClipboardError::Platform(format!("Clipboard task failed: {}", e)))?
    }

    async fn write(&self, kind: ContentKind, content: &[u8]) -> Result<(), ClipboardError> {
        let content = Bytes::copy_from_slice(content);
        let applied = Arc::clone(&self.applied);
        tokio::task::spawn_blocking(move || write_blocking(kind, content, &applied))
            .await
            .map_err(|e| ClipboardError::Platform(format!("Clipboard task failed: {}", e)))?
    }

    fn name(&self) -> &str {
        "system"
    }
}

fn read_blocking(
    kind: ContentKind,
    applied: &Mutex<Option<AppliedImage>>,
) -> Result<Option<Bytes>, ClipboardError> {
    let mut clipboard = Clipboard::new().map_err(platform_error)?;

    match kind {
        ContentKind::Text => match clipboard.get_text() {
            Ok(text) if text.is_empty() => Ok(None),
            Ok(text) => Ok(Some(Bytes::from(text.into_bytes()))),
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(platform_error(e)),
        },
        ContentKind::Image => match clipboard.get_image() {
            Ok(image) => {
                let applied = applied.lock().unwrap_or_else(|e| e.into_inner());
                match applied.as_ref() {
                    Some(last) if last.matches(&image) => Ok(Some(last.png.clone())),
                    _ => encode_png(image).map(Some),
                }
            }
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(platform_error(e)),
        },
    }
}

fn write_blocking(
    kind: ContentKind,
    content: Bytes,
    applied: &Mutex<Option<AppliedImage>>,
) -> Result<(), ClipboardError> {
    let mut clipboard = Clipboard::new().map_err(platform_error)?;

    match kind {
        ContentKind::Text => {
            let text =
                String::from_utf8(content.to_vec()).map_err(|_| ClipboardError::InvalidText)?;
            debug!("Setting clipboard text: {} bytes", text.len());
            clipboard.set_text(text).map_err(platform_error)
        }
        ContentKind::Image => {
            let image = decode_png(&content)?;
            debug!(
                "Setting clipboard image: {}x{}",
                image.width, image.height
            );
            let last = AppliedImage {
                width: image.width,
                height: image.height,
                rgba: image.bytes.to_vec(),
                png: content,
            };
            clipboard.set_image(image).map_err(platform_error)?;
            *applied.lock().unwrap_or_else(|e| e.into_inner()) = Some(last);
            Ok(())
        }
    }
}

/// Encode an RGBA clipboard image as PNG
pub fn encode_png(image: ImageData<'_>) -> Result<Bytes, ClipboardError> {
    let rgba = RgbaImage::from_raw(
        image.width as u32,
        image.height as u32,
        image.bytes.into_owned(),
    )
    .ok_or_else(|| ClipboardError::Image("Clipboard image has inconsistent dimensions".to_string()))?;

    let mut png = Cursor::new(Vec::new());
    rgba.write_to(&mut png, ImageFormat::Png)
        .map_err(|e| ClipboardError::Image(e.to_string()))?;
    Ok(Bytes::from(png.into_inner()))
}

/// Decode PNG (or any format `image` recognizes) into an RGBA clipboard image
pub fn decode_png(data: &[u8]) -> Result<ImageData<'static>, ClipboardError> {
    let decoded = image::load_from_memory(data)
        .map_err(|e| ClipboardError::Image(e.to_string()))?
        .into_rgba8();

    Ok(ImageData {
        width: decoded.width() as usize,
        height: decoded.height() as usize,
        bytes: Cow::Owned(decoded.into_raw()),
    })
}

fn platform_error(e: arboard::Error) -> ClipboardError {
    ClipboardError::Platform(e.to_string())
}
