//! The peer hub
//!
//! [`Hub`] is a cheap, cloneable handle. All peer set changes and fan-out go
//! through [`HubLoop`], a single task that owns every peer's outbound queue,
//! so membership is only ever touched from one place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::guard::ContentGuard;
use crate::clipboard::{ClipboardBackend, ContentKind};
use crate::transport::SyncMessage;

/// Identifier of a peer within one hub
pub type PeerId = u64;

/// Hub errors
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub loop is no longer running
    #[error("Hub loop has stopped")]
    Stopped,
}

/// Tuning knobs for a hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each peer's outbound queue
    pub queue_capacity: usize,

    /// Capacity of the hub's event channel
    pub event_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            event_capacity: 64,
        }
    }
}

/// A connected peer as seen by the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: PeerId,
    pub remote: String,
}

/// What a connection gets back when it joins the hub
#[derive(Debug)]
pub struct PeerRegistration {
    pub id: PeerId,

    /// Receiving end of the peer's outbound queue
    pub queue: mpsc::Receiver<SyncMessage>,

    /// Cancelled when the hub drops the peer (unregister, eviction, shutdown)
    pub removed: CancellationToken,
}

enum HubEvent {
    Register(PeerSlot),
    Unregister(PeerId),
    Broadcast {
        message: SyncMessage,
        source: Option<PeerId>,
    },
    Peers(oneshot::Sender<Vec<PeerInfo>>),
}

struct HubShared {
    id: String,
    guard: ContentGuard,
    clipboard: Arc<dyn ClipboardBackend>,
    next_peer: AtomicU64,
    queue_capacity: usize,
}

/// Handle to a running hub
#[derive(Clone)]
pub struct Hub {
    shared: Arc<HubShared>,
    events: mpsc::Sender<HubEvent>,
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub").field("id", &self.shared.id).finish()
    }
}

impl Hub {
    /// Create a hub with a fresh random identity.
    ///
    /// Nothing happens until the returned [`HubLoop`] is run.
    pub fn new(clipboard: Arc<dyn ClipboardBackend>, config: HubConfig) -> (Self, HubLoop) {
        Self::with_id(Uuid::new_v4().to_string(), clipboard, config)
    }

    /// Create a hub with a caller-chosen identity
    pub fn with_id(
        id: impl Into<String>,
        clipboard: Arc<dyn ClipboardBackend>,
        config: HubConfig,
    ) -> (Self, HubLoop) {
        let (events, event_rx) = mpsc::channel(config.event_capacity.max(1));

        let hub = Self {
            shared: Arc::new(HubShared {
                id: id.into(),
                guard: ContentGuard::new(),
                clipboard,
                next_peer: AtomicU64::new(1),
                queue_capacity: config.queue_capacity.max(1),
            }),
            events,
        };
        let hub_loop = HubLoop {
            events: event_rx,
            peers: HashMap::new(),
        };

        (hub, hub_loop)
    }

    /// Create a hub and spawn its loop on the current runtime
    pub fn spawn(
        clipboard: Arc<dyn ClipboardBackend>,
        config: HubConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (hub, hub_loop) = Self::new(clipboard, config);
        tokio::spawn(hub_loop.run(shutdown));
        hub
    }

    /// This hub's session identity
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// The clipboard this hub reads from and applies to
    pub fn clipboard(&self) -> &Arc<dyn ClipboardBackend> {
        &self.shared.clipboard
    }

    /// Dedup gate, see [`ContentGuard::is_new_content`]
    pub fn is_new_content(&self, content: &Bytes, kind: ContentKind) -> bool {
        self.shared.guard.is_new_content(content, kind)
    }

    /// Send a locally produced update to every peer
    pub async fn broadcast_local(&self, content: Bytes, kind: ContentKind) -> Result<(), HubError> {
        let message = SyncMessage::new(self.shared.id.clone(), kind, content);
        self.broadcast(message, None).await
    }

    /// Fan `message` out to every peer except `source`
    pub async fn broadcast(
        &self,
        message: SyncMessage,
        source: Option<PeerId>,
    ) -> Result<(), HubError> {
        self.submit(HubEvent::Broadcast { message, source }).await
    }

    /// Add a peer to the peer set
    pub async fn register_peer(
        &self,
        remote: impl Into<String>,
    ) -> Result<PeerRegistration, HubError> {
        let id = self.shared.next_peer.fetch_add(1, Ordering::Relaxed);
        let (queue, queue_rx) = mpsc::channel(self.shared.queue_capacity);
        let removed = CancellationToken::new();

        let slot = PeerSlot {
            info: PeerInfo {
                id,
                remote: remote.into(),
            },
            queue,
            removed: removed.clone(),
        };
        self.submit(HubEvent::Register(slot)).await?;

        Ok(PeerRegistration {
            id,
            queue: queue_rx,
            removed,
        })
    }

    /// Remove a peer. Removing an unknown or already removed peer is a no-op.
    pub async fn unregister_peer(&self, id: PeerId) -> Result<(), HubError> {
        self.submit(HubEvent::Unregister(id)).await
    }

    /// Snapshot of the current peer set
    pub async fn peers(&self) -> Result<Vec<PeerInfo>, HubError> {
        let (tx, rx) = oneshot::channel();
        self.submit(HubEvent::Peers(tx)).await?;
        rx.await.map_err(|_| HubError::Stopped)
    }

    /// Handle an update received from a peer.
    ///
    /// Self-originated and already-seen updates are dropped. Anything else is
    /// applied to the local clipboard and relayed to every other peer.
    /// Returns whether the update was accepted.
    pub async fn accept_remote(
        &self,
        message: SyncMessage,
        source: Option<PeerId>,
    ) -> Result<bool, HubError> {
        if message.origin == self.shared.id {
            debug!("Discarding own update echoed back by peer {:?}", source);
            return Ok(false);
        }

        if !self.is_new_content(&message.content, message.kind) {
            debug!("Discarding already applied {} update", message.kind);
            return Ok(false);
        }

        info!(
            "Applying {} update from {} ({} bytes)",
            message.kind,
            message.origin,
            message.content.len()
        );
        if let Err(e) = self
            .shared
            .clipboard
            .write(message.kind, &message.content)
            .await
        {
            warn!("Failed to update local clipboard: {}", e);
        }

        self.broadcast(message, source).await?;
        Ok(true)
    }

    /// Handle content pushed in from outside the mesh (e.g. over HTTP).
    ///
    /// New content is applied locally and broadcast under this hub's identity.
    pub async fn publish_local(&self, content: Bytes, kind: ContentKind) -> Result<bool, HubError> {
        if !self.is_new_content(&content, kind) {
            return Ok(false);
        }

        if let Err(e) = self.shared.clipboard.write(kind, &content).await {
            warn!("Failed to update local clipboard: {}", e);
        }

        self.broadcast_local(content, kind).await?;
        Ok(true)
    }

    async fn submit(&self, event: HubEvent) -> Result<(), HubError> {
        self.events.send(event).await.map_err(|_| HubError::Stopped)
    }
}

/// The coordinating loop of a hub. Exclusively owns the peer set.
pub struct HubLoop {
    events: mpsc::Receiver<HubEvent>,
    peers: HashMap<PeerId, PeerSlot>,
}

struct PeerSlot {
    info: PeerInfo,
    queue: mpsc::Sender<SyncMessage>,
    removed: CancellationToken,
}

impl Drop for PeerSlot {
    // The slot holds the only sender, so dropping it also closes the queue
    fn drop(&mut self) {
        self.removed.cancel();
    }
}

impl HubLoop {
    /// Process events until `shutdown` fires or every [`Hub`] handle is gone.
    ///
    /// On exit all outbound queues are closed, which tears down every peer.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Hub loop started");

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            self.handle(event);
        }

        info!("Hub loop stopped with {} peers", self.peers.len());
        self.peers.clear();
    }

    fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register(slot) => {
                info!("Peer connected: {} (#{})", slot.info.remote, slot.info.id);
                self.peers.insert(slot.info.id, slot);
            }
            HubEvent::Unregister(id) => {
                if let Some(slot) = self.peers.remove(&id) {
                    info!("Peer disconnected: {} (#{})", slot.info.remote, id);
                }
            }
            HubEvent::Broadcast { message, source } => self.fan_out(message, source),
            HubEvent::Peers(reply) => {
                let mut peers: Vec<PeerInfo> =
                    self.peers.values().map(|slot| slot.info.clone()).collect();
                peers.sort_by_key(|peer| peer.id);
                let _ = reply.send(peers);
            }
        }
    }

    fn fan_out(&mut self, message: SyncMessage, source: Option<PeerId>) {
        let mut evicted = Vec::new();

        for (id, slot) in &self.peers {
            if Some(*id) == source {
                continue;
            }
            match slot.queue.try_send(message.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Peer {} cannot keep up, evicting", slot.info.remote);
                    evicted.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Peer {} writer already gone", slot.info.remote);
                    evicted.push(*id);
                }
            }
        }

        for id in evicted {
            self.peers.remove(&id);
        }
    }
}
