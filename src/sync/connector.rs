//! Outbound dial-and-retry loop
//!
//! One connector per configured peer address. A failed dial waits a fixed
//! delay and tries again, forever. A dropped connection is redialed at once.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hub::Hub;
use super::peer::PeerConnection;
use crate::transport::Dialer;

/// Delay between failed dial attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Keeps one outbound link to `address` alive
pub struct Connector {
    hub: Hub,
    dialer: Arc<dyn Dialer>,
    address: String,
    retry_delay: Duration,
}

impl Connector {
    pub fn new(hub: Hub, dialer: Arc<dyn Dialer>, address: impl Into<String>) -> Self {
        Self {
            hub,
            dialer,
            address: address.into(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Dial, serve, redial until `shutdown` fires or the hub stops
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Connecting to peer: {}", self.address);
        let mut failures: u64 = 0;

        loop {
            let dialed = tokio::select! {
                _ = shutdown.cancelled() => break,
                dialed = self.dialer.dial(&self.address) => dialed,
            };

            let link = match dialed {
                Ok(link) => link,
                Err(e) => {
                    failures += 1;
                    debug!(
                        "Dial {} failed (attempt {}): {}",
                        self.address, failures, e
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = sleep(self.retry_delay) => continue,
                    }
                }
            };

            info!("Successfully connected to peer: {}", self.address);
            failures = 0;

            let connection = match PeerConnection::start(&self.hub, link).await {
                Ok(connection) => connection,
                Err(e) => {
                    warn!("Giving up on {}: {}", self.address, e);
                    break;
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {
                    connection.close();
                    break;
                }
                _ = connection.closed() => {
                    info!("Connection to {} lost, redialing", self.address);
                }
            }
        }

        debug!("Connector for {} stopped", self.address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::MemoryClipboard;
    use crate::sync::HubConfig;
    use crate::transport::{memory, Link, Result, TransportError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    /// Fails the first `failures` dials, then hands out in-memory links and
    /// passes the far end to the test
    struct FlakyDialer {
        failures: usize,
        attempts: AtomicUsize,
        far_ends: mpsc::UnboundedSender<Link>,
    }

    #[async_trait]
    impl Dialer for FlakyDialer {
        async fn dial(&self, address: &str) -> Result<Link> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(TransportError::Connection {
                    message: format!("{} refused", address),
                });
            }

            let (near, far) = memory::pair("local", address);
            let _ = self.far_ends.send(far);
            Ok(near)
        }
    }

    async fn wait_for_peers(hub: &Hub, count: usize) {
        timeout(WAIT, async {
            while hub.peers().await.unwrap().len() != count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("peer count never reached");
    }

    #[tokio::test]
    async fn test_retries_then_registers_once() {
        let shutdown = CancellationToken::new();
        let hub = Hub::spawn(
            Arc::new(MemoryClipboard::new()),
            HubConfig::default(),
            shutdown.clone(),
        );

        let (far_tx, mut far_rx) = mpsc::unbounded_channel();
        let dialer = Arc::new(FlakyDialer {
            failures: 3,
            attempts: AtomicUsize::new(0),
            far_ends: far_tx,
        });

        let connector = Connector::new(hub.clone(), dialer.clone(), "ws://peer/ws")
            .with_retry_delay(Duration::from_millis(10));
        let task = tokio::spawn(connector.run(shutdown.clone()));

        let mut far = timeout(WAIT, far_rx.recv()).await.unwrap().unwrap();
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 4);
        wait_for_peers(&hub, 1).await;

        // Still exactly one connection while the link is up
        sleep(Duration::from_millis(50)).await;
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(hub.peers().await.unwrap().len(), 1);

        // Drop the link from the far side: the connector redials by itself
        far.writer.close().await.unwrap();
        let _second = timeout(WAIT, far_rx.recv()).await.unwrap().unwrap();
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 5);
        wait_for_peers(&hub, 1).await;

        shutdown.cancel();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_retry_wait() {
        let shutdown = CancellationToken::new();
        let hub = Hub::spawn(
            Arc::new(MemoryClipboard::new()),
            HubConfig::default(),
            shutdown.clone(),
        );

        let (far_tx, _far_rx) = mpsc::unbounded_channel();
        let dialer = Arc::new(FlakyDialer {
            failures: usize::MAX,
            attempts: AtomicUsize::new(0),
            far_ends: far_tx,
        });

        let connector = Connector::new(hub, dialer.clone(), "ws://down/ws");
        assert_eq!(connector.retry_delay, DEFAULT_RETRY_DELAY);
        let task = tokio::spawn(connector.run(shutdown.clone()));

        sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        timeout(WAIT, task).await.unwrap().unwrap();
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 1);
    }
}
