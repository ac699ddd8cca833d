//! Hubs talking over real websocket connections

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use common::{TestHub, WAIT};
use syncclip::clipboard::ContentKind;
use syncclip::server;
use syncclip::sync::Connector;
use syncclip::transport::websocket::WebSocketDialer;

fn start_server(hub: &TestHub) -> SocketAddr {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (bound, serving) = server::bind(hub.hub.clone(), addr, hub.shutdown.clone()).unwrap();
    tokio::spawn(serving);
    bound
}

/// Bind on a fixed address, retrying while a previous listener lets go of it
async fn start_server_at(hub: &TestHub, addr: SocketAddr) {
    let serving = timeout(WAIT, async {
        loop {
            match server::bind(hub.hub.clone(), addr, hub.shutdown.clone()) {
                Ok((_, serving)) => break serving,
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    })
    .await
    .expect("address never became free");
    tokio::spawn(serving);
}

fn connector(from: &TestHub, to: SocketAddr) -> Connector {
    Connector::new(
        from.hub.clone(),
        Arc::new(WebSocketDialer::new(Duration::from_secs(2))),
        format!("ws://{}/ws", to),
    )
    .with_retry_delay(Duration::from_millis(50))
}

#[tokio::test]
async fn test_updates_flow_both_ways() {
    let dialing = TestHub::start("A");
    let listening = TestHub::start("B");
    let addr = start_server(&listening);

    tokio::spawn(connector(&dialing, addr).run(dialing.shutdown.clone()));
    dialing.wait_for_peers(1).await;
    listening.wait_for_peers(1).await;

    dialing
        .hub
        .publish_local(Bytes::from_static(b"from A"), ContentKind::Text)
        .await
        .unwrap();
    listening.wait_for_text(b"from A").await;

    listening
        .hub
        .publish_local(Bytes::from_static(b"from B"), ContentKind::Text)
        .await
        .unwrap();
    dialing.wait_for_text(b"from B").await;
}

#[tokio::test]
async fn test_connector_waits_for_late_server() {
    // Reserve a port, release it, and only start listening after the
    // connector has failed a few times
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let dialing = TestHub::start("A");
    tokio::spawn(connector(&dialing, addr).run(dialing.shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(dialing.hub.peers().await.unwrap().is_empty());

    let listening = TestHub::start("B");
    start_server_at(&listening, addr).await;

    dialing.wait_for_peers(1).await;
    listening.wait_for_peers(1).await;
}

#[tokio::test]
async fn test_server_shutdown_triggers_redial() {
    let dialing = TestHub::start("A");
    let listening = TestHub::start("B");
    let addr = start_server(&listening);

    let stop = CancellationToken::new();
    let task = tokio::spawn(connector(&dialing, addr).run(stop.clone()));
    dialing.wait_for_peers(1).await;

    // Restart the far hub on the same address
    drop(listening);
    dialing.wait_for_peers(0).await;

    let restarted = TestHub::start("B2");
    start_server_at(&restarted, addr).await;
    dialing.wait_for_peers(1).await;

    stop.cancel();
    timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_large_image_reaches_dialing_hub() {
    let dialing = TestHub::start("A");
    let listening = TestHub::start("B");
    let addr = start_server(&listening);

    tokio::spawn(connector(&dialing, addr).run(dialing.shutdown.clone()));
    dialing.wait_for_peers(1).await;
    listening.wait_for_peers(1).await;

    // Its base64 frame is well past tungstenite's 16 MiB default
    let image = Bytes::from((0..=255u8).cycle().take(20 * 1024 * 1024).collect::<Vec<_>>());
    listening
        .hub
        .publish_local(image.clone(), ContentKind::Image)
        .await
        .unwrap();

    let clipboard = dialing.clipboard.clone();
    common::wait_until(move || clipboard.get(ContentKind::Image).is_some()).await;
    assert!(dialing.clipboard.get(ContentKind::Image) == Some(image));
    assert_eq!(dialing.hub.peers().await.unwrap().len(), 1);
}
