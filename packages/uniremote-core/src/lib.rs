//! UniRemote Core - shared library for the UniRemote media-player remote.
//!
//! This crate contains everything a remote-control client needs below the
//! presentation layer: finding the desktop companion on the local network,
//! keeping one session to it, sending commands, decoding its replies into
//! typed events, and caching the artwork it sends.
//!
//! # Architecture
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: Typed events published to the presentation layer
//! - [`identity`]: Locally persisted device identity
//! - [`transport`]: Peer transport seam and the LAN (DNS-SD + TCP) transport
//! - [`protocol`]: Outbound commands and inbound message schemas
//! - [`dispatch`]: Classification and routing of inbound payloads
//! - [`artwork`]: Two-tier (memory + disk) artwork cache
//! - [`session`]: Session manager (connection lifecycle, command queueing)
//! - [`bootstrap`]: Composition root
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`PeerTransport`](transport::PeerTransport): Discovery and delivery to the remote peer

#![warn(clippy::all)]

pub mod artwork;
pub mod bootstrap;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod identity;
pub mod protocol;
pub mod protocol_constants;
pub mod runtime;
pub mod session;
pub mod state;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_fixtures;

// Re-export commonly used types at the crate root
pub use artwork::{ArtworkCache, ArtworkCacheConfig, ArtworkImage, ArtworkKind};
pub use bootstrap::{bootstrap_services, bootstrap_services_with_transport, BootstrappedServices};
pub use dispatch::{DispatchOutcome, MessageDispatcher};
pub use error::{ErrorCode, RemoteError, RemoteResult};
pub use events::{
    ArtworkEvent, BroadcastEvent, BroadcastEventBridge, ConnectionEvent, DiscoveryEvent,
    EventEmitter, LibraryEvent, PlaybackEvent, RequestEvent,
};
pub use identity::PeerIdentity;
pub use protocol::{Album, Artist, Command, InboundMessage, NowPlaying, SearchResult, Song};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{ArtworkTaskSlot, ServerSelection, SessionManager};
pub use state::Config;
pub use transport::{
    LanTransport, PeerCandidate, PeerTransport, SessionState, TransportError, TransportEvent,
};
pub use utils::{format_time, now_millis};
