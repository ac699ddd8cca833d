//! WebSocket links
//!
//! Outbound links are dialed with `tokio-tungstenite`. Inbound links arrive
//! through the `warp` upgrade on the sync path. Both are adapted to the same
//! [`FrameReader`]/[`FrameWriter`] halves so a peer connection cannot tell
//! them apart.

use super::{Dialer, FrameReader, FrameWriter, Link, Result, TransportError};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{
    connect_async_with_config, tungstenite::Message as WsMessage, MaybeTlsStream,
    WebSocketStream,
};
use tracing::{debug, instrument, warn};

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Path peers serve their websocket endpoint on
pub const SYNC_PATH: &str = "ws";

/// Largest websocket message either side of a link accepts. Base64 grows
/// payloads by a third, so this leaves room for a full-size clipboard item.
pub const MAX_MESSAGE_SIZE: usize = crate::MAX_PAYLOAD_SIZE * 2;

fn client_config() -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(MAX_MESSAGE_SIZE))
        .max_frame_size(Some(MAX_MESSAGE_SIZE))
}

/// Reading half of a dialed websocket
pub struct ClientReader {
    stream: SplitStream<ClientStream>,
}

/// Writing half of a dialed websocket
pub struct ClientWriter {
    sink: SplitSink<ClientStream, WsMessage>,
}

#[async_trait]
impl FrameReader for ClientReader {
    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        while let Some(ws_msg) = self.stream.next().await {
            match ws_msg {
                Ok(WsMessage::Text(text)) => return Ok(text.as_str().as_bytes().to_vec()),
                Ok(WsMessage::Binary(data)) => return Ok(data.to_vec()),
                Ok(WsMessage::Close(_)) => {
                    debug!("WebSocket connection closed by peer");
                    return Err(TransportError::ConnectionClosed);
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                    // Pong is handled automatically by tokio-tungstenite
                }
                Ok(WsMessage::Frame(_)) => {
                    warn!("Received unexpected raw frame");
                }
                Err(e) => {
                    return Err(TransportError::WebSocket {
                        message: e.to_string(),
                    })
                }
            }
        }
        Err(TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl FrameWriter for ClientWriter {
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<()> {
        let text = String::from_utf8(frame)
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        self.sink
            .send(WsMessage::text(text))
            .await
            .map_err(|e| TransportError::WebSocket {
                message: e.to_string(),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::WebSocket {
                message: e.to_string(),
            })
    }
}

/// Open an outbound websocket link
#[instrument]
pub async fn dial(url: &str, connect_timeout: Duration) -> Result<Link> {
    let connecting = connect_async_with_config(url, Some(client_config()), false);
    let (ws_stream, _response) = tokio::time::timeout(connect_timeout, connecting)
        .await
        .map_err(|_| TransportError::Connection {
            message: format!("Timed out connecting to {}", url),
        })?
        .map_err(|e| TransportError::WebSocket {
            message: format!("Failed to establish WebSocket connection to {}: {}", url, e),
        })?;

    let (sink, stream) = ws_stream.split();
    Ok(Link::new(
        ClientReader { stream },
        ClientWriter { sink },
        url,
    ))
}

/// Dials peers over websocket
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    connect_timeout: Duration,
}

impl WebSocketDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketDialer {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl Dialer for WebSocketDialer {
    async fn dial(&self, address: &str) -> Result<Link> {
        dial(address, self.connect_timeout).await
    }
}

/// Reading half of an accepted websocket
pub struct ServerReader {
    stream: SplitStream<warp::ws::WebSocket>,
}

/// Writing half of an accepted websocket
pub struct ServerWriter {
    sink: SplitSink<warp::ws::WebSocket, warp::ws::Message>,
}

#[async_trait]
impl FrameReader for ServerReader {
    async fn read_frame(&mut self) -> Result<Vec<u8>> {
        while let Some(ws_msg) = self.stream.next().await {
            let ws_msg = ws_msg.map_err(|e| TransportError::WebSocket {
                message: e.to_string(),
            })?;

            if ws_msg.is_close() {
                debug!("WebSocket connection closed by peer");
                return Err(TransportError::ConnectionClosed);
            }
            if ws_msg.is_text() || ws_msg.is_binary() {
                return Ok(ws_msg.as_bytes().to_vec());
            }
        }
        Err(TransportError::ConnectionClosed)
    }
}

#[async_trait]
impl FrameWriter for ServerWriter {
    async fn write_frame(&mut self, frame: Vec<u8>) -> Result<()> {
        let text = String::from_utf8(frame)
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        self.sink
            .send(warp::ws::Message::text(text))
            .await
            .map_err(|e| TransportError::WebSocket {
                message: e.to_string(),
            })
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::WebSocket {
                message: e.to_string(),
            })
    }
}

/// Wrap an upgraded inbound websocket as a link
pub fn accept(ws: warp::ws::WebSocket, remote: impl Into<String>) -> Link {
    let (sink, stream) = ws.split();
    Link::new(ServerReader { stream }, ServerWriter { sink }, remote)
}
