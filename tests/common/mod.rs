//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use syncclip::clipboard::{ContentKind, MemoryClipboard};
use syncclip::sync::{Hub, HubConfig};

pub const WAIT: Duration = Duration::from_secs(5);

/// A hub with an in-memory clipboard and a running loop
pub struct TestHub {
    pub hub: Hub,
    pub clipboard: Arc<MemoryClipboard>,
    pub shutdown: CancellationToken,
}

impl TestHub {
    pub fn start(id: &str) -> Self {
        let clipboard = Arc::new(MemoryClipboard::new());
        let shutdown = CancellationToken::new();
        let (hub, hub_loop) = Hub::with_id(id, clipboard.clone(), HubConfig::default());
        tokio::spawn(hub_loop.run(shutdown.clone()));
        Self {
            hub,
            clipboard,
            shutdown,
        }
    }

    pub async fn wait_for_text(&self, expected: &[u8]) {
        let clipboard = self.clipboard.clone();
        wait_until(move || {
            clipboard
                .get(ContentKind::Text)
                .map_or(false, |content| content.as_ref() == expected)
        })
        .await;
    }

    pub async fn wait_for_peers(&self, count: usize) {
        let hub = self.hub.clone();
        wait_until_async(move || {
            let hub = hub.clone();
            async move { hub.peers().await.map_or(false, |peers| peers.len() == count) }
        })
        .await;
    }
}

impl Drop for TestHub {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

pub async fn wait_until_async<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(WAIT, async {
        while !check().await {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
