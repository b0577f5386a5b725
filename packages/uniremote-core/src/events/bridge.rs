//! Bridge implementation that maps domain events to a broadcast channel.
//!
//! The [`BroadcastEventBridge`] is the publish side of the event system. Each
//! consumer calls [`BroadcastEventBridge::subscribe`] to get its own receiver,
//! so there are no process-wide implicit listeners.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{
    ArtworkEvent, BroadcastEvent, ConnectionEvent, DiscoveryEvent, LibraryEvent, PlaybackEvent,
    RequestEvent,
};

/// Bridges domain events to a `tokio::sync::broadcast` channel.
///
/// An optional external emitter can be attached after construction (e.g. a
/// UI toolkit adapter); it receives every event before the broadcast send.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self::with_sender(tx)
    }

    /// Creates a new bridge wrapping an existing broadcast sender.
    pub fn with_sender(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter for platform-specific event delivery.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Returns a reference to the broadcast sender.
    pub fn sender(&self) -> &broadcast::Sender<BroadcastEvent> {
        &self.tx
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_connection, ConnectionEvent, Connection);
    impl_emit!(emit_discovery, DiscoveryEvent, Discovery);
    impl_emit!(emit_library, LibraryEvent, Library);
    impl_emit!(emit_artwork, ArtworkEvent, Artwork);
    impl_emit!(emit_playback, PlaybackEvent, Playback);
    impl_emit!(emit_request, RequestEvent, Request);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_each_receive_events() {
        let bridge = BroadcastEventBridge::new(8);
        let mut first = bridge.subscribe();
        let mut second = bridge.subscribe();

        bridge.emit_request(RequestEvent::Finished);

        assert!(matches!(
            first.recv().await.unwrap(),
            BroadcastEvent::Request(RequestEvent::Finished)
        ));
        assert!(matches!(
            second.recv().await.unwrap(),
            BroadcastEvent::Request(RequestEvent::Finished)
        ));
    }

    #[test]
    fn emitting_without_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_playback(PlaybackEvent::StateChanged { is_playing: false });
    }
}
