//! Local clipboard change detection

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ClipboardBackend, ContentKind};
use crate::sync::Hub;

/// Default polling interval for clipboard changes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Poll `backend` for `kind` and yield each payload that differs from the
/// previous read.
///
/// Whatever is on the clipboard when polling starts is the baseline and is
/// not emitted. Empty reads are ignored. The stream ends when `shutdown`
/// fires or the receiver is dropped.
pub fn watch_changes(
    backend: Arc<dyn ClipboardBackend>,
    kind: ContentKind,
    poll_interval: Duration,
    shutdown: CancellationToken,
) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut previous = backend.read(kind).await.ok().flatten();
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match backend.read(kind).await {
                Ok(Some(content)) if !content.is_empty() => {
                    if previous.as_ref() == Some(&content) {
                        continue;
                    }
                    previous = Some(content.clone());
                    if tx.send(content).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("Failed to read {} clipboard: {}", kind, e),
            }
        }

        debug!("Stopped polling {} clipboard", kind);
    });

    rx
}

/// Feeds local clipboard changes into a hub
pub struct ClipboardWatcher {
    hub: Hub,
    poll_interval: Duration,
}

impl ClipboardWatcher {
    pub fn new(hub: Hub) -> Self {
        Self {
            hub,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Watch every tracked kind on its own task
    pub fn start(self, shutdown: &CancellationToken) -> Vec<JoinHandle<()>> {
        let watcher = Arc::new(self);
        ContentKind::ALL
            .iter()
            .map(|&kind| {
                let watcher = Arc::clone(&watcher);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { watcher.watch(kind, shutdown).await })
            })
            .collect()
    }

    /// Watch one kind until `shutdown` fires
    pub async fn watch(&self, kind: ContentKind, shutdown: CancellationToken) {
        let mut changes = watch_changes(
            Arc::clone(self.hub.clipboard()),
            kind,
            self.poll_interval,
            shutdown.clone(),
        );

        loop {
            let content = tokio::select! {
                _ = shutdown.cancelled() => break,
                content = changes.recv() => match content {
                    Some(content) => content,
                    None => break,
                },
            };

            if !self.hub.is_new_content(&content, kind) {
                continue;
            }

            info!("Local clipboard change detected ({})", kind);
            if let Err(e) = self.hub.broadcast_local(content, kind).await {
                warn!("Stopping {} watcher: {}", kind, e);
                break;
            }
        }
    }
}
