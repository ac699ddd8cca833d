//! Per-link reader/writer pumps
//!
//! A [`PeerConnection`] behaves the same whether we dialed the link or
//! accepted it. The two pumps share one cancellation token, which the hub
//! also cancels when it drops the peer, so when either side stops the whole
//! pair comes down and the hub is told.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::hub::{Hub, HubError, PeerId};
use crate::transport::{FrameReader, FrameWriter, Link, SyncMessage};

/// Upper bound on a graceful close of a link whose peer stopped reading
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// A live peer link registered with a hub
#[derive(Debug)]
pub struct PeerConnection {
    id: PeerId,
    remote: String,
    done: CancellationToken,
}

impl PeerConnection {
    /// Register `link` with the hub and start both pumps
    pub async fn start(hub: &Hub, link: Link) -> Result<Self, HubError> {
        let Link {
            reader,
            writer,
            remote,
        } = link;

        let registration = hub.register_peer(remote.clone()).await?;
        let id = registration.id;
        let queue = registration.queue;
        let done = registration.removed;

        tokio::spawn(write_pump(id, writer, queue, done.clone()));
        tokio::spawn(read_pump(hub.clone(), id, reader, done.clone()));

        Ok(Self { id, remote, done })
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Resolves once both pumps have been told to stop
    pub async fn closed(&self) {
        self.done.cancelled().await
    }

    pub fn is_closed(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Tear the connection down
    pub fn close(&self) {
        self.done.cancel();
    }
}

async fn read_pump(
    hub: Hub,
    id: PeerId,
    mut reader: Box<dyn FrameReader>,
    done: CancellationToken,
) {
    debug!("Starting read pump for peer #{}", id);

    loop {
        let frame = tokio::select! {
            _ = done.cancelled() => break,
            frame = reader.read_frame() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Read from peer #{} ended: {}", id, e);
                break;
            }
        };

        let message = match SyncMessage::from_frame(&frame) {
            Ok(message) => message,
            Err(e) => {
                debug!("Discarding malformed frame from peer #{}: {}", id, e);
                continue;
            }
        };

        if let Err(e) = hub.accept_remote(message, Some(id)).await {
            warn!("Dropping peer #{}: {}", id, e);
            break;
        }
    }

    done.cancel();
    let _ = hub.unregister_peer(id).await;
    debug!("Read pump ended for peer #{}", id);
}

async fn write_pump(
    id: PeerId,
    mut writer: Box<dyn FrameWriter>,
    mut queue: mpsc::Receiver<SyncMessage>,
    done: CancellationToken,
) {
    debug!("Starting write pump for peer #{}", id);

    loop {
        let message = tokio::select! {
            _ = done.cancelled() => break,
            message = queue.recv() => match message {
                Some(message) => message,
                None => {
                    debug!("Outbound queue closed for peer #{}", id);
                    break;
                }
            },
        };

        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                continue;
            }
        };

        let written = tokio::select! {
            _ = done.cancelled() => break,
            written = writer.write_frame(frame) => written,
        };
        if let Err(e) = written {
            debug!("Write to peer #{} failed: {}", id, e);
            break;
        }
    }

    done.cancel();
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await;
    debug!("Write pump ended for peer #{}", id);
}
