//! Event system for the presentation layer.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for fan-out to any number of subscribers
//! - Event types for each domain (connection, discovery, library, ...)
//!
//! Events are a closed set of variants: the presentation layer matches on
//! them instead of registering per-callback delegates.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::artwork::ArtworkKind;
use crate::protocol::{Album, Artist, NowPlaying, SearchResult, Song};
use crate::transport::{PeerCandidate, SessionState};

/// Events broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Session lifecycle and connectivity.
    Connection(ConnectionEvent),

    /// Companion discovery on the local network.
    Discovery(DiscoveryEvent),

    /// Browse listings (genres, artists, albums, songs, search).
    Library(LibraryEvent),

    /// Artwork arrivals.
    Artwork(ArtworkEvent),

    /// Playback metadata and position.
    Playback(PlaybackEvent),

    /// Request progress, for spinners.
    Request(RequestEvent),
}

/// Events related to the session with the companion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// The transport reported a new session state (repeats are suppressed).
    StateChanged {
        /// Display name of the peer the state refers to.
        peer: String,
        /// New session state.
        state: SessionState,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Connectivity flipped. Driven by state changes and by inbound traffic.
    ConnectivityChanged {
        connected: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A disconnect survived the debounce window.
    DisconnectConfirmed {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events from companion discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DiscoveryEvent {
    /// A new candidate was added to the discovery list.
    PeerFound {
        peer: PeerCandidate,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A candidate disappeared from the network.
    PeerLost {
        #[serde(rename = "displayName")]
        display_name: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// More than one candidate is known; the user should pick one.
    MultiplePeersFound {
        peers: Vec<PeerCandidate>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Browse listings delivered by the companion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LibraryEvent {
    GenresUpdated {
        genres: Vec<String>,
    },
    /// Artists for a genre (`"All"` for the whole library).
    ArtistsUpdated {
        genre: String,
        artists: Vec<Artist>,
        /// True for an incremental batch rather than a full listing.
        batch: bool,
    },
    /// Albums for an artist (`"All"` for the whole library).
    AlbumsUpdated {
        artist: String,
        albums: Vec<Album>,
        batch: bool,
    },
    /// Songs of an album, ordered by track number.
    SongsUpdated {
        #[serde(rename = "albumName")]
        album_name: String,
        songs: Vec<Song>,
    },
    SearchResults {
        results: Vec<SearchResult>,
    },
}

/// Artwork arrivals. Exactly one event is emitted per accepted artwork item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ArtworkEvent {
    /// A decoded image for `name` is now in the cache.
    Updated { kind: ArtworkKind, name: String },
    /// The payload for `name` did not decode; a single-item re-fetch was issued.
    RefetchRequested {
        kind: ArtworkKind,
        name: String,
        reason: String,
    },
}

/// Playback metadata from the companion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    NowPlaying {
        info: NowPlaying,
    },
    /// Playback position, raw and formatted as `m:ss`.
    Progress {
        #[serde(rename = "currentTime")]
        current_time: f64,
        duration: f64,
        elapsed: String,
        total: String,
    },
    StateChanged {
        #[serde(rename = "isPlaying")]
        is_playing: bool,
    },
}

/// Request progress markers for the presentation layer's activity indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RequestEvent {
    /// A browse or search request was issued (possibly queued).
    Started { command: String },
    /// A browse or search reply arrived.
    Finished,
}

// From implementations for converting inner events to BroadcastEvent
impl From<ConnectionEvent> for BroadcastEvent {
    fn from(event: ConnectionEvent) -> Self {
        BroadcastEvent::Connection(event)
    }
}

impl From<DiscoveryEvent> for BroadcastEvent {
    fn from(event: DiscoveryEvent) -> Self {
        BroadcastEvent::Discovery(event)
    }
}

impl From<LibraryEvent> for BroadcastEvent {
    fn from(event: LibraryEvent) -> Self {
        BroadcastEvent::Library(event)
    }
}

impl From<ArtworkEvent> for BroadcastEvent {
    fn from(event: ArtworkEvent) -> Self {
        BroadcastEvent::Artwork(event)
    }
}

impl From<PlaybackEvent> for BroadcastEvent {
    fn from(event: PlaybackEvent) -> Self {
        BroadcastEvent::Playback(event)
    }
}

impl From<RequestEvent> for BroadcastEvent {
    fn from(event: RequestEvent) -> Self {
        BroadcastEvent::Request(event)
    }
}
