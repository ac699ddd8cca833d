//! In-process links
//!
//! Two connected links backed by channels. Dropping or closing either writer
//! ends the opposite reader, like a socket would.

use super::{FrameReader, FrameWriter, Link, Result, TransportError};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Channel-backed reader
#[derive(Debug)]
pub struct MemoryReader {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Channel-backed writer
#[derive(Debug)]
pub struct MemoryWriter {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[async_trait]
impl FrameReader for MemoryReader {
    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        self.rx.recv().await.ok_or(TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl FrameWriter for MemoryWriter {
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(frame).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }
}

/// Raw channel halves: a reader and the writer that feeds it
pub fn channel() -> (MemoryWriter, MemoryReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryWriter { tx: Some(tx) }, MemoryReader { rx })
}

/// Two links wired back to back
pub fn pair(left: &str, right: &str) -> (Link, Link) {
    let (left_tx, right_rx) = channel();
    let (right_tx, left_rx) = channel();

    (
        Link::new(left_rx, left_tx, right),
        Link::new(right_rx, right_tx, left),
    )
}
