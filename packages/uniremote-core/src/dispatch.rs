//! Inbound payload dispatch.
//!
//! [`MessageDispatcher::dispatch`] classifies one inbound payload, turns it
//! into events and cache writes, and reports what the session manager still
//! has to do ([`DispatchOutcome`]). It never fails: malformed, unknown and
//! stale messages are logged and dropped.

use std::sync::Arc;

use crate::artwork::{ArtworkCache, ArtworkError, ArtworkKind};
use crate::events::{ArtworkEvent, EventEmitter, LibraryEvent, PlaybackEvent, RequestEvent};
use crate::protocol::{ArtworkItem, Command, InboundMessage, MessageError, Payload};
use crate::protocol_constants::LIVENESS_MESSAGE;
use crate::session::ArtworkTaskSlot;
use crate::utils::format_time;

/// Follow-up work produced by dispatching one payload.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// The payload parsed, so the peer is evidently connected.
    pub liveness: bool,
    /// Re-fetch commands for artwork that failed to decode.
    pub commands: Vec<Command>,
    /// Album names from a listing whose artwork may need syncing.
    pub album_artwork_check: Vec<String>,
}

/// Routes inbound payloads to events and the artwork cache.
pub struct MessageDispatcher {
    artwork_cache: Arc<ArtworkCache>,
    artwork_task: ArtworkTaskSlot,
    emitter: Arc<dyn EventEmitter>,
}

impl MessageDispatcher {
    pub fn new(
        artwork_cache: Arc<ArtworkCache>,
        artwork_task: ArtworkTaskSlot,
        emitter: Arc<dyn EventEmitter>,
    ) -> Self {
        Self {
            artwork_cache,
            artwork_task,
            emitter,
        }
    }

    /// Dispatches one inbound payload.
    pub fn dispatch(&self, bytes: &[u8]) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let envelope = match Payload::parse(bytes) {
            Ok(Payload::Envelope(envelope)) => envelope,
            Ok(Payload::Text(text)) => {
                outcome.liveness = true;
                if text.trim() == LIVENESS_MESSAGE {
                    log::trace!("[Dispatch] Liveness message");
                } else {
                    log::debug!("[Dispatch] Ignoring text payload: {:?}", text);
                }
                return outcome;
            }
            Err(e) => {
                log::warn!("[Dispatch] Dropping payload: {}", e);
                return outcome;
            }
        };

        outcome.liveness = true;

        // A bulk reply answers the outstanding request whether or not its
        // body decodes, so the marker is released on the tag alone.
        if let Some(kind) = envelope.bulk_artwork_kind() {
            if !self.artwork_task.complete_if(kind) {
                log::debug!(
                    "[Dispatch] Discarding stale bulk {} artwork (outstanding: {:?})",
                    kind,
                    self.artwork_task.current()
                );
                return outcome;
            }
        }

        match envelope.decode() {
            Ok(message) => self.handle_message(message, &mut outcome),
            Err(MessageError::UnknownType(kind)) => {
                log::warn!("[Dispatch] Unknown message type: {}", kind);
            }
            Err(e) => log::warn!("[Dispatch] Dropping message: {}", e),
        }
        outcome
    }

    fn handle_message(&self, message: InboundMessage, outcome: &mut DispatchOutcome) {
        let finishes_request = message.finishes_request();

        match message {
            InboundMessage::Genres(genres) => {
                log::debug!("[Dispatch] {} genre(s)", genres.len());
                self.emitter
                    .emit_library(LibraryEvent::GenresUpdated { genres });
            }
            InboundMessage::Artists {
                genre,
                artists,
                batch,
            } => {
                log::debug!("[Dispatch] {} artist(s) for {}", artists.len(), genre);
                self.emitter.emit_library(LibraryEvent::ArtistsUpdated {
                    genre,
                    artists,
                    batch,
                });
            }
            InboundMessage::Albums {
                artist,
                albums,
                batch,
            } => {
                log::debug!("[Dispatch] {} album(s) for {}", albums.len(), artist);
                outcome.album_artwork_check = albums
                    .iter()
                    .map(|album| album.album_name.trim())
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect();
                self.emitter.emit_library(LibraryEvent::AlbumsUpdated {
                    artist,
                    albums,
                    batch,
                });
            }
            InboundMessage::Artwork { kind, items, bulk } => {
                log::debug!(
                    "[Dispatch] {} {} artwork item(s){}",
                    items.len(),
                    kind,
                    if bulk { " (bulk)" } else { "" }
                );
                for item in items {
                    self.handle_artwork(kind, item, outcome);
                }
            }
            InboundMessage::Songs { album_name, songs } => {
                log::debug!("[Dispatch] {} song(s) for {}", songs.len(), album_name);
                self.emitter
                    .emit_library(LibraryEvent::SongsUpdated { album_name, songs });
            }
            InboundMessage::SearchResults(results) => {
                log::debug!("[Dispatch] {} search result(s)", results.len());
                self.emitter
                    .emit_library(LibraryEvent::SearchResults { results });
            }
            InboundMessage::NowPlaying(info) => {
                self.emitter.emit_playback(PlaybackEvent::NowPlaying { info });
            }
            InboundMessage::Progress {
                current_time,
                duration,
            } => {
                self.emitter.emit_playback(PlaybackEvent::Progress {
                    current_time,
                    duration,
                    elapsed: format_time(current_time),
                    total: format_time(duration),
                });
            }
            InboundMessage::PlaybackState { is_playing } => {
                self.emitter
                    .emit_playback(PlaybackEvent::StateChanged { is_playing });
            }
        }

        if finishes_request {
            self.emitter.emit_request(RequestEvent::Finished);
        }
    }

    fn handle_artwork(&self, kind: ArtworkKind, item: ArtworkItem, outcome: &mut DispatchOutcome) {
        let ArtworkItem {
            name,
            artwork_base64,
        } = item;

        let Some(data) = artwork_base64 else {
            self.refetch(kind, name, "missing artwork payload".to_string(), outcome);
            return;
        };

        match self.artwork_cache.store_base64(&data, &name) {
            Ok(_) => {
                log::trace!("[Dispatch] Stored {} artwork for {}", kind, name);
                self.emitter
                    .emit_artwork(ArtworkEvent::Updated { kind, name });
            }
            Err(ArtworkError::EmptyKey) => {
                log::debug!("[Dispatch] Skipping {} artwork with a blank name", kind);
            }
            Err(e) => self.refetch(kind, name, e.to_string(), outcome),
        }
    }

    fn refetch(&self, kind: ArtworkKind, name: String, reason: String, outcome: &mut DispatchOutcome) {
        log::warn!(
            "[Dispatch] Bad {} artwork for {} ({}); re-fetching",
            kind,
            name,
            reason
        );
        outcome.commands.push(match kind {
            ArtworkKind::Artist => Command::GetArtistArtwork(name.clone()),
            ArtworkKind::Album => Command::GetAlbumArtwork(name.clone()),
        });
        self.emitter
            .emit_artwork(ArtworkEvent::RefetchRequested { kind, name, reason });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artwork::ArtworkCacheConfig;
    use crate::events::BroadcastEvent;
    use crate::runtime::TokioSpawner;
    use crate::test_fixtures::{sample_png_base64, RecordingEmitter};

    struct Harness {
        dispatcher: MessageDispatcher,
        cache: Arc<ArtworkCache>,
        task: ArtworkTaskSlot,
        events: Arc<RecordingEmitter>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = ArtworkCacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ..ArtworkCacheConfig::default()
        };
        let cache = Arc::new(ArtworkCache::new(&config, &TokioSpawner::current()).unwrap());
        let task = ArtworkTaskSlot::new();
        let events = Arc::new(RecordingEmitter::default());
        Harness {
            dispatcher: MessageDispatcher::new(cache.clone(), task.clone(), events.clone()),
            cache,
            task,
            events,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn album_listing_is_delivered_once() {
        let h = harness();
        let outcome = h.dispatcher.dispatch(
            br#"{"type":"albums","data":[{"id":"1","albumName":"A","artistName":"B"}],"artist":"B"}"#,
        );

        assert!(outcome.liveness);
        assert_eq!(outcome.album_artwork_check, vec!["A".to_string()]);
        let listings: Vec<_> = h
            .events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                BroadcastEvent::Library(LibraryEvent::AlbumsUpdated { artist, albums, .. }) => {
                    Some((artist, albums))
                }
                _ => None,
            })
            .collect();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].0, "B");
        assert_eq!(listings[0].1.len(), 1);
        assert_eq!(listings[0].1[0].album_name, "A");
        assert!(h
            .events
            .events()
            .contains(&BroadcastEvent::Request(RequestEvent::Finished)));
    }

    #[tokio::test]
    async fn progress_is_formatted() {
        let h = harness();
        h.dispatcher
            .dispatch(br#"{"type":"progress","currentTime":65,"duration":200}"#);

        assert_eq!(
            h.events.events(),
            vec![BroadcastEvent::Playback(PlaybackEvent::Progress {
                current_time: 65.0,
                duration: 200.0,
                elapsed: "1:05".into(),
                total: "3:20".into(),
            })]
        );
    }

    #[tokio::test]
    async fn unknown_type_produces_no_events() {
        let h = harness();
        let outcome = h.dispatcher.dispatch(br#"{"type":"lyrics","data":"la la"}"#);
        assert!(outcome.liveness);
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn liveness_text_and_garbage() {
        let h = harness();
        assert!(h.dispatcher.dispatch(b"connected").liveness);
        assert!(!h.dispatcher.dispatch(&[0xff, 0xfe]).liveness);
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn stale_bulk_artwork_is_discarded() {
        let h = harness();
        let payload = format!(
            r#"{{"type":"artistArtworks","data":[{{"artistName":"A","artworkBase64":"{}"}}]}}"#,
            sample_png_base64(2, 2)
        );

        // Nothing outstanding
        h.dispatcher.dispatch(payload.as_bytes());
        // Wrong kind outstanding
        h.task.begin(ArtworkKind::Album);
        h.dispatcher.dispatch(payload.as_bytes());

        assert!(h.events.events().is_empty());
        assert!(!h.cache.has_image("A"));
        assert_eq!(h.task.current(), Some(ArtworkKind::Album));
    }

    #[tokio::test]
    async fn matching_bulk_artwork_is_stored_and_clears_marker() {
        let h = harness();
        h.task.begin(ArtworkKind::Artist);
        let payload = format!(
            r#"{{"type":"artistArtworks","data":[
                {{"artistName":"A","artworkBase64":"{}"}},
                {{"artistName":"B","artworkBase64":"bm90IGFuIGltYWdl"}}
            ]}}"#,
            sample_png_base64(2, 2)
        );

        let outcome = h.dispatcher.dispatch(payload.as_bytes());

        assert_eq!(h.task.current(), None);
        assert!(h.cache.lookup_cached("A").is_some());
        assert_eq!(outcome.commands, vec![Command::GetArtistArtwork("B".into())]);
        let events = h.events.events();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            BroadcastEvent::Artwork(ArtworkEvent::Updated {
                kind: ArtworkKind::Artist,
                name: "A".into()
            })
        );
        assert!(matches!(
            &events[1],
            BroadcastEvent::Artwork(ArtworkEvent::RefetchRequested { name, .. }) if name == "B"
        ));
    }

    #[tokio::test]
    async fn single_album_artwork_is_not_gated() {
        let h = harness();
        let payload = format!(
            r#"{{"type":"albumArtwork","data":{{"albumName":"Blue","artworkBase64":"{}"}}}}"#,
            sample_png_base64(3, 3)
        );

        h.dispatcher.dispatch(payload.as_bytes());

        assert!(h.cache.lookup_cached("Blue").is_some());
        assert_eq!(
            h.events.events(),
            vec![BroadcastEvent::Artwork(ArtworkEvent::Updated {
                kind: ArtworkKind::Album,
                name: "Blue".into()
            })]
        );
    }

    #[tokio::test]
    async fn corrupt_single_artwork_requests_refetch() {
        let h = harness();
        let outcome = h
            .dispatcher
            .dispatch(br#"{"type":"albumArtwork","albumName":"Blue","artworkBase64":"@@@"}"#);
        assert_eq!(outcome.commands, vec![Command::GetAlbumArtwork("Blue".into())]);
        assert!(!h.cache.has_image("Blue"));
    }

    #[tokio::test]
    async fn artwork_is_cached_without_subscribers() {
        let h = harness();
        let dispatcher = MessageDispatcher::new(
            h.cache.clone(),
            h.task.clone(),
            Arc::new(crate::events::NoopEventEmitter),
        );
        let payload = format!(
            r#"{{"type":"artistArtwork","artistName":"Nina","artworkBase64":"{}"}}"#,
            sample_png_base64(2, 2)
        );

        dispatcher.dispatch(payload.as_bytes());

        assert!(h.cache.has_image("Nina"));
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn bulk_reply_without_data_releases_marker() {
        let h = harness();
        h.task.begin(ArtworkKind::Album);

        let outcome = h.dispatcher.dispatch(br#"{"type":"albumArtworks"}"#);

        assert!(outcome.liveness);
        assert_eq!(h.task.current(), None);
        assert!(h.events.events().is_empty());
    }

    #[tokio::test]
    async fn bulk_reply_of_other_kind_keeps_marker() {
        let h = harness();
        h.task.begin(ArtworkKind::Album);

        h.dispatcher.dispatch(br#"{"type":"artistArtworks"}"#);

        assert_eq!(h.task.current(), Some(ArtworkKind::Album));
    }

    #[tokio::test]
    async fn batches_do_not_finish_the_request() {
        let h = harness();
        h.dispatcher.dispatch(
            br#"{"type":"artistsBatch","genre":"Jazz","data":[{"name":"Nina"}]}"#,
        );
        h.dispatcher.dispatch(
            br#"{"type":"albumsBatch","genre":"all","data":[{"id":"1","name":"Blue"}]}"#,
        );
        assert!(!h
            .events
            .events()
            .contains(&BroadcastEvent::Request(RequestEvent::Finished)));

        h.dispatcher
            .dispatch(br#"{"type":"artists","genre":"Jazz","data":[{"name":"Nina"}]}"#);
        let finished = h
            .events
            .events()
            .into_iter()
            .filter(|event| *event == BroadcastEvent::Request(RequestEvent::Finished))
            .count();
        assert_eq!(finished, 1);
    }
}
