//! Event emitter abstraction for decoupling services from delivery.
//!
//! The session manager and dispatcher depend on the [`EventEmitter`] trait
//! rather than a concrete channel, so tests can count events and embedders
//! can forward them to a UI toolkit.

use super::{
    ArtworkEvent, ConnectionEvent, DiscoveryEvent, LibraryEvent, PlaybackEvent, RequestEvent,
};

/// Trait for emitting domain events without knowledge of delivery.
pub trait EventEmitter: Send + Sync {
    /// Emits a session/connectivity event.
    fn emit_connection(&self, event: ConnectionEvent);

    /// Emits a discovery event.
    fn emit_discovery(&self, event: DiscoveryEvent);

    /// Emits a browse listing.
    fn emit_library(&self, event: LibraryEvent);

    /// Emits an artwork event.
    fn emit_artwork(&self, event: ArtworkEvent);

    /// Emits playback metadata.
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a request progress marker.
    fn emit_request(&self, event: RequestEvent);
}

/// No-op emitter. Events are silently discarded.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_connection(&self, _event: ConnectionEvent) {}
    fn emit_discovery(&self, _event: DiscoveryEvent) {}
    fn emit_library(&self, _event: LibraryEvent) {}
    fn emit_artwork(&self, _event: ArtworkEvent) {}
    fn emit_playback(&self, _event: PlaybackEvent) {}
    fn emit_request(&self, _event: RequestEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }

    fn emit_discovery(&self, event: DiscoveryEvent) {
        tracing::debug!(?event, "discovery_event");
    }

    fn emit_library(&self, event: LibraryEvent) {
        // Listings can be large; log the variant only.
        let kind = match &event {
            LibraryEvent::GenresUpdated { genres } => format!("genres({})", genres.len()),
            LibraryEvent::ArtistsUpdated { artists, .. } => format!("artists({})", artists.len()),
            LibraryEvent::AlbumsUpdated { albums, .. } => format!("albums({})", albums.len()),
            LibraryEvent::SongsUpdated { songs, .. } => format!("songs({})", songs.len()),
            LibraryEvent::SearchResults { results } => format!("search({})", results.len()),
        };
        tracing::debug!(%kind, "library_event");
    }

    fn emit_artwork(&self, event: ArtworkEvent) {
        tracing::debug!(?event, "artwork_event");
    }

    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }

    fn emit_request(&self, event: RequestEvent) {
        tracing::debug!(?event, "request_event");
    }
}
