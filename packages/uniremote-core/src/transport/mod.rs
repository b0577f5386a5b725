//! Peer transport seam.
//!
//! The session manager talks to the network only through [`PeerTransport`].
//! Transports report discovery, session state and inbound payloads as
//! [`TransportEvent`]s on an mpsc channel handed to them at construction.
//!
//! [`LanTransport`] is the production implementation: DNS-SD discovery plus a
//! framed TCP session.

mod frame;
mod lan;

pub use frame::{read_frame, write_frame};
pub use lan::LanTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// A companion found on the network, not necessarily connected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerCandidate {
    /// Transport-specific unique identifier (DNS-SD full name for the LAN transport).
    pub id: String,
    /// Human-readable name; discovery deduplicates on this.
    pub display_name: String,
    /// Where to connect, e.g. `192.168.1.20:5050`.
    pub endpoint: String,
}

/// State of the session with a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Everything a transport reports to the session manager.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    PeerFound(PeerCandidate),
    PeerLost { display_name: String },
    StateChanged { peer: String, state: SessionState },
    Received { peer: String, payload: Bytes },
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no connected peer")]
    NotConnected,
    #[error("mDNS daemon error: {0}")]
    Mdns(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("frame of {0} bytes exceeds the maximum frame length")]
    FrameTooLarge(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("transport closed")]
    Closed,
}

/// Discovery and delivery to the remote peer.
///
/// Implementations never block the caller on network round trips:
/// [`invite`](Self::invite) returns immediately and reports the outcome as
/// [`TransportEvent::StateChanged`].
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Starts browsing for candidates. Reports them as [`TransportEvent::PeerFound`].
    async fn start_browsing(&self) -> Result<(), TransportError>;

    /// Stops browsing. No-op if not browsing.
    async fn stop_browsing(&self);

    /// Starts a connection attempt bounded by `timeout`.
    async fn invite(&self, candidate: &PeerCandidate, timeout: Duration);

    /// Sends one payload on the reliable, ordered channel.
    async fn send(&self, payload: Bytes) -> Result<(), TransportError>;

    /// Whether a session is currently established.
    fn is_connected(&self) -> bool;
}
