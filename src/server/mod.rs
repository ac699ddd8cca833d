//! HTTP and websocket front door of a hub
//!
//! - `GET /ws` upgrades to a peer link
//! - `POST /` pushes the request body into the mesh
//! - `GET /` returns the current clipboard, image before text

use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warp::http::{Method, StatusCode};
use warp::Filter;

use crate::clipboard::ContentKind;
use crate::sync::{Hub, PeerConnection};
use crate::transport::websocket::{self, MAX_MESSAGE_SIZE, SYNC_PATH};
use crate::MAX_PAYLOAD_SIZE;

/// Server errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listen address could not be parsed
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),

    /// Socket could not be bound
    #[error("Failed to bind: {0}")]
    Bind(#[from] warp::Error),
}

/// All routes a hub serves
pub fn routes(
    hub: Hub,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    sync_route(hub.clone())
        .or(push_route(hub.clone()))
        .or(pull_route(hub))
}

fn with_hub(hub: Hub) -> impl Filter<Extract = (Hub,), Error = std::convert::Infallible> + Clone {
    warp::any().map(move || hub.clone())
}

fn sync_route(
    hub: Hub,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path(SYNC_PATH)
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::addr::remote())
        .and(with_hub(hub))
        .map(|ws: warp::ws::Ws, addr: Option<SocketAddr>, hub: Hub| {
            ws.max_message_size(MAX_MESSAGE_SIZE)
                .max_frame_size(MAX_MESSAGE_SIZE)
                .on_upgrade(move |socket| handle_peer(hub, socket, addr))
        })
}

fn remote_host(addr: Option<SocketAddr>) -> String {
    addr.map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn request_line(method: &Method, addr: Option<SocketAddr>) -> String {
    format!("{} / from {}", method, remote_host(addr))
}

async fn handle_peer(hub: Hub, socket: warp::ws::WebSocket, addr: Option<SocketAddr>) {
    let remote = remote_host(addr);
    let link = websocket::accept(socket, remote.clone());

    match PeerConnection::start(&hub, link).await {
        Ok(connection) => {
            connection.closed().await;
            debug!("Inbound peer {} finished", remote);
        }
        Err(e) => warn!("Rejecting peer {}: {}", remote, e),
    }
}

fn push_route(
    hub: Hub,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::end()
        .and(warp::post())
        .and(warp::addr::remote())
        .and(warp::header::optional::<String>("content-type"))
        .and(warp::body::content_length_limit(MAX_PAYLOAD_SIZE as u64))
        .and(warp::body::bytes())
        .and(with_hub(hub))
        .and_then(handle_push)
}

async fn handle_push(
    addr: Option<SocketAddr>,
    content_type: Option<String>,
    body: Bytes,
    hub: Hub,
) -> Result<Box<dyn warp::Reply>, warp::Rejection> {
    let kind = ContentKind::from_content_type(content_type.as_deref().unwrap_or_default());
    info!("{}", request_line(&Method::POST, addr));
    debug!("Received {} bytes of {}", body.len(), kind);

    if body.is_empty() {
        return Ok(Box::new(StatusCode::OK));
    }

    let len = body.len();
    match hub.publish_local(body, kind).await {
        Ok(true) => info!("Clipboard updated via POST: {} bytes", len),
        Ok(false) => debug!("POSTed content already current"),
        Err(e) => {
            warn!("Cannot publish POSTed content: {}", e);
            return Ok(Box::new(StatusCode::SERVICE_UNAVAILABLE));
        }
    }

    Ok(Box::new(StatusCode::OK))
}

fn pull_route(
    hub: Hub,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .and(warp::addr::remote())
        .and(with_hub(hub))
        .and_then(handle_pull)
}

async fn handle_pull(
    addr: Option<SocketAddr>,
    hub: Hub,
) -> Result<Box<dyn warp::Reply>, warp::Rejection> {
    info!("{}", request_line(&Method::GET, addr));
    for kind in [ContentKind::Image, ContentKind::Text] {
        match hub.clipboard().read(kind).await {
            Ok(Some(content)) if !content.is_empty() => {
                info!("Sending {}: {} bytes", kind, content.len());
                return Ok(Box::new(warp::reply::with_header(
                    content.to_vec(),
                    "content-type",
                    kind.mime_type(),
                )));
            }
            Ok(_) => {}
            Err(e) => debug!("Failed to read {} clipboard: {}", kind, e),
        }
    }

    info!("Clipboard is empty");
    Ok(Box::new(StatusCode::NO_CONTENT))
}

/// Bind the hub's server to `addr`.
///
/// Returns the bound address and a future that serves until `shutdown`
/// fires.
pub fn bind(
    hub: Hub,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(SocketAddr, impl Future<Output = ()>), ServerError> {
    let (bound, server) = warp::serve(routes(hub))
        .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })?;
    Ok((bound, server))
}

/// Serve on `listen` (e.g. `"0.0.0.0:2352"`) until `shutdown` fires
pub async fn serve(hub: Hub, listen: &str, shutdown: CancellationToken) -> crate::Result<()> {
    let addr: SocketAddr = listen
        .parse()
        .map_err(|_| ServerError::InvalidAddress(listen.to_string()))?;

    let (bound, server) = bind(hub, addr, shutdown)?;
    info!("Starting syncclip server on {}", bound);
    server.await;
    info!("Server stopped");
    Ok(())
}
