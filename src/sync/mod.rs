//! Peer hub: deduplication, fan-out, per-peer pumps and reconnection

pub mod connector;
pub mod guard;
pub mod hub;
pub mod peer;

pub use connector::{Connector, DEFAULT_RETRY_DELAY};
pub use guard::ContentGuard;
pub use hub::{Hub, HubConfig, HubError, HubLoop, PeerId, PeerInfo, PeerRegistration};
pub use peer::PeerConnection;
