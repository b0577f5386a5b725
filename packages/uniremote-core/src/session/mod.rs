//! Session manager.
//!
//! Owns the one logical connection to the companion and mediates all command
//! traffic:
//!
//! - Commands sent while disconnected are queued and flushed in order once
//!   the session reaches `connected` (after a grace delay)
//! - Transport state reports are deduplicated before they reach consumers
//! - Disconnects are confirmed only after a debounce window
//! - Inbound payloads go through the [`MessageDispatcher`]
//!
//! All transport events are handled by a single dispatch loop
//! ([`SessionManager::start`]), so consumers never see re-entrant events.
//! Transport faults are logged and surfaced as connectivity events; no public
//! operation returns an error for them.

mod artwork_task;
mod discovery;
mod throttle;

pub use artwork_task::ArtworkTaskSlot;
pub use discovery::ServerSelection;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use self::discovery::{Added, DiscoveryList};
use self::throttle::ArtworkRequestThrottle;
use crate::artwork::{ArtworkCache, ArtworkKind};
use crate::dispatch::{DispatchOutcome, MessageDispatcher};
use crate::events::{ConnectionEvent, DiscoveryEvent, EventEmitter, RequestEvent};
use crate::protocol::Command;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::Config;
use crate::transport::{PeerCandidate, PeerTransport, SessionState, TransportError, TransportEvent};
use crate::utils::now_millis;

#[derive(Default)]
struct SessionInner {
    last_state: Option<SessionState>,
    connectivity: Option<bool>,
    pending: VecDeque<String>,
    /// A flush owns the head of `pending` until it clears this.
    flushing: bool,
    /// Bumped on every accepted state change; timers started in an older
    /// epoch do nothing when they fire.
    epoch: u64,
    discovery: DiscoveryList,
    browsing: bool,
}

/// What [`SessionManager::begin_flush`] found.
enum FlushStart {
    /// Another flush is draining the queue.
    Busy,
    /// Nothing queued.
    Empty,
    /// This caller owns the flush.
    Started,
}

/// Mediates all traffic with the companion.
pub struct SessionManager {
    config: Config,
    transport: Arc<dyn PeerTransport>,
    emitter: Arc<dyn EventEmitter>,
    dispatcher: MessageDispatcher,
    artwork_cache: Arc<ArtworkCache>,
    artwork_task: ArtworkTaskSlot,
    throttle: ArtworkRequestThrottle,
    spawner: TokioSpawner,
    cancel: CancellationToken,
    artwork_preloaded: AtomicBool,
    inner: Mutex<SessionInner>,
}

impl SessionManager {
    pub fn new(
        config: Config,
        transport: Arc<dyn PeerTransport>,
        artwork_cache: Arc<ArtworkCache>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
        cancel: CancellationToken,
    ) -> Self {
        let artwork_task = ArtworkTaskSlot::new();
        let dispatcher = MessageDispatcher::new(
            Arc::clone(&artwork_cache),
            artwork_task.clone(),
            Arc::clone(&emitter),
        );
        let throttle = ArtworkRequestThrottle::new(config.artwork_request_interval());
        Self {
            config,
            transport,
            emitter,
            dispatcher,
            artwork_cache,
            artwork_task,
            throttle,
            spawner,
            cancel,
            artwork_preloaded: AtomicBool::new(false),
            inner: Mutex::new(SessionInner::default()),
        }
    }

    /// Starts the dispatch loop over `events` and the artwork request worker.
    ///
    /// Both stop when the session's cancellation token fires.
    pub fn start(self: &Arc<Self>, mut events: mpsc::Receiver<TransportEvent>) {
        let session = Arc::clone(self);
        self.spawner
            .spawn_until_cancelled(self.cancel.clone(), async move {
                while let Some(event) = events.recv().await {
                    session.handle_transport_event(event).await;
                }
                log::debug!("[Session] Transport event channel closed");
            });

        match self.throttle.take_receiver() {
            Some(requests) => {
                let session = Arc::clone(self);
                self.spawner.spawn_until_cancelled(
                    self.cancel.clone(),
                    session.run_artwork_requests(requests),
                );
            }
            None => log::warn!("[Session] start() called twice; artwork worker already running"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Discovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts browsing for companions. Clears the stale discovery list.
    /// No-op if already browsing.
    pub async fn start_discovery(&self) {
        {
            let mut inner = self.inner.lock();
            if inner.browsing {
                return;
            }
            inner.browsing = true;
            inner.discovery.clear();
        }
        if let Err(e) = self.transport.start_browsing().await {
            log::warn!("[Session] Failed to start discovery: {}", e);
            self.inner.lock().browsing = false;
        }
    }

    /// Stops browsing. No-op if not browsing.
    pub async fn stop_discovery(&self) {
        {
            let mut inner = self.inner.lock();
            if !inner.browsing {
                return;
            }
            inner.browsing = false;
        }
        self.transport.stop_browsing().await;
    }

    /// Forgets discovered servers and restarts discovery.
    pub async fn refresh_servers(&self) {
        log::info!("[Session] Refreshing servers");
        self.inner.lock().discovery.clear();
        self.stop_discovery().await;
        self.start_discovery().await;
    }

    pub fn discovered_peers(&self) -> Vec<PeerCandidate> {
        self.inner.lock().discovery.peers().to_vec()
    }

    pub fn server_selection(&self) -> ServerSelection {
        self.inner.lock().discovery.selection()
    }

    pub fn is_discovering(&self) -> bool {
        self.inner.lock().browsing
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connection and commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts a connection attempt. The outcome arrives as a state change.
    pub async fn connect(&self, candidate: &PeerCandidate) {
        log::info!("[Session] Inviting {}", candidate.display_name);
        self.transport
            .invite(candidate, self.config.connect_timeout())
            .await;
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Number of commands waiting for a connection.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Sends a typed command, queueing it if not connected.
    pub async fn send_command(&self, command: Command) {
        if command.is_tracked_request() {
            self.emitter.emit_request(RequestEvent::Started {
                command: command.to_string(),
            });
        }
        self.send_raw(command.to_string()).await;
    }

    /// Sends an opaque command string, queueing it if not connected.
    ///
    /// While older commands are still queued, new ones join the queue even if
    /// the transport is connected, so nothing overtakes them.
    pub async fn send_raw(&self, command: impl Into<String>) {
        let command = command.into();
        {
            let mut inner = self.inner.lock();
            if !self.transport.is_connected() || inner.flushing || !inner.pending.is_empty() {
                log::debug!("[Session] Queueing {}", command);
                inner.pending.push_back(command);
                return;
            }
        }

        match self.transport.send(Bytes::from(command.clone())).await {
            Ok(()) => log::trace!("[Session] Sent {}", command),
            Err(TransportError::NotConnected) => {
                log::debug!("[Session] Lost connection; queueing {}", command);
                self.inner.lock().pending.push_back(command);
            }
            Err(e) => log::warn!("[Session] Failed to send {}: {}", command, e),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Artwork
    // ─────────────────────────────────────────────────────────────────────────

    pub fn artwork_cache(&self) -> &Arc<ArtworkCache> {
        &self.artwork_cache
    }

    pub fn artwork_task(&self) -> &ArtworkTaskSlot {
        &self.artwork_task
    }

    /// Clears the outstanding bulk artwork marker. Idempotent.
    pub fn cancel_artwork_request(&self) {
        self.artwork_task.cancel();
    }

    /// Requests artwork for every artist as one bulk fetch.
    pub async fn request_all_artist_artworks(&self) {
        self.start_bulk_artwork(ArtworkKind::Artist, Command::GetAllArtistArtworks)
            .await;
    }

    /// Requests artwork for every album as one bulk fetch.
    pub async fn request_all_album_artworks(&self) {
        self.start_bulk_artwork(ArtworkKind::Album, Command::GetAllAlbumArtworks)
            .await;
    }

    /// Queues a throttled single-item artwork request.
    ///
    /// Returns false if the same request is already waiting.
    pub fn request_artwork(&self, kind: ArtworkKind, name: &str) -> bool {
        let command = match kind {
            ArtworkKind::Artist => Command::GetArtistArtwork(name.to_string()),
            ArtworkKind::Album => Command::GetAlbumArtwork(name.to_string()),
        };
        self.throttle.request(command)
    }

    async fn start_bulk_artwork(&self, kind: ArtworkKind, command: Command) {
        self.cancel_artwork_request();
        self.artwork_task.begin(kind);
        self.send_command(command).await;
    }

    /// Requests artwork for albums in `names` that are in neither cache tier.
    ///
    /// The disk tier is preloaded into memory on the first call.
    pub async fn sync_album_artwork(&self, names: &[String]) -> usize {
        if !self.artwork_preloaded.swap(true, Ordering::SeqCst) {
            if let Err(e) = self.artwork_cache.preload().await {
                log::warn!("[Session] Artwork preload failed: {}", e);
            }
        }

        let mut requested = 0;
        for name in names {
            let name = name.trim();
            if name.is_empty() || self.artwork_cache.has_image(name) {
                continue;
            }
            if self.request_artwork(ArtworkKind::Album, name) {
                requested += 1;
            }
        }
        if requested > 0 {
            log::info!("[Session] Requesting {} missing album artwork(s)", requested);
        }
        requested
    }

    async fn run_artwork_requests(self: Arc<Self>, mut requests: mpsc::UnboundedReceiver<Command>) {
        let interval = self.throttle.interval();
        while let Some(command) = requests.recv().await {
            self.throttle.dequeued(&command);
            self.send_command(command).await;
            tokio::time::sleep(interval).await;
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport events
    // ─────────────────────────────────────────────────────────────────────────

    /// Handles one transport event. Called by the dispatch loop.
    pub async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::PeerFound(candidate) => self.on_peer_found(candidate).await,
            TransportEvent::PeerLost { display_name } => self.on_peer_lost(display_name),
            TransportEvent::StateChanged { peer, state } => self.on_state_changed(peer, state),
            TransportEvent::Received { peer, payload } => {
                log::trace!("[Session] {} bytes from {}", payload.len(), peer);
                let outcome = self.dispatcher.dispatch(&payload);
                self.apply_outcome(outcome);
            }
        }
    }

    async fn on_peer_found(&self, candidate: PeerCandidate) {
        let added = self.inner.lock().discovery.add(candidate.clone());
        match added {
            Added::Duplicate => {
                log::trace!("[Session] Duplicate candidate {}", candidate.display_name);
            }
            Added::Only(peer) => {
                log::info!("[Session] Found {}", peer.display_name);
                self.emitter.emit_discovery(DiscoveryEvent::PeerFound {
                    peer: peer.clone(),
                    timestamp: now_millis(),
                });
                self.connect(&peer).await;
                self.send_command(Command::GetGenres).await;
            }
            Added::AmongMany(peers) => {
                log::info!(
                    "[Session] Found {} ({} servers known)",
                    candidate.display_name,
                    peers.len()
                );
                self.emitter.emit_discovery(DiscoveryEvent::PeerFound {
                    peer: candidate,
                    timestamp: now_millis(),
                });
                self.emitter
                    .emit_discovery(DiscoveryEvent::MultiplePeersFound {
                        peers,
                        timestamp: now_millis(),
                    });
            }
        }
    }

    fn on_peer_lost(&self, display_name: String) {
        if !self.inner.lock().discovery.remove(&display_name) {
            return;
        }
        log::info!("[Session] Lost {}", display_name);
        self.emitter.emit_discovery(DiscoveryEvent::PeerLost {
            display_name,
            timestamp: now_millis(),
        });
    }

    fn on_state_changed(self: &Arc<Self>, peer: String, state: SessionState) {
        let epoch = {
            let mut inner = self.inner.lock();
            if inner.last_state == Some(state) {
                return;
            }
            inner.last_state = Some(state);
            inner.epoch += 1;
            inner.epoch
        };

        log::info!("[Session] {} is {:?}", peer, state);
        self.emitter.emit_connection(ConnectionEvent::StateChanged {
            peer,
            state,
            timestamp: now_millis(),
        });

        match state {
            SessionState::Connected => {
                self.set_connectivity(true);
                let session = Arc::clone(self);
                self.spawner
                    .spawn_until_cancelled(self.cancel.clone(), async move {
                        tokio::time::sleep(session.config.connect_grace()).await;
                        session.on_connection_settled(epoch).await;
                    });
            }
            SessionState::Connecting => self.set_connectivity(false),
            SessionState::Disconnected => {
                self.set_connectivity(false);
                let session = Arc::clone(self);
                self.spawner
                    .spawn_until_cancelled(self.cancel.clone(), async move {
                        tokio::time::sleep(session.config.disconnect_debounce()).await;
                        if !session.is_current_epoch(epoch) {
                            log::debug!("[Session] State changed during debounce window");
                        } else if session.transport.is_connected() {
                            log::debug!("[Session] Disconnect recovered within debounce window");
                        } else {
                            log::info!("[Session] Disconnect confirmed");
                            session
                                .emitter
                                .emit_connection(ConnectionEvent::DisconnectConfirmed {
                                    timestamp: now_millis(),
                                });
                        }
                    });
            }
        }
    }

    fn is_current_epoch(&self, epoch: u64) -> bool {
        self.inner.lock().epoch == epoch
    }

    /// Runs after the grace delay: flush the queue, or bootstrap if it is empty.
    ///
    /// Does nothing if the state changed since `epoch` began.
    async fn on_connection_settled(&self, epoch: u64) {
        if !self.is_current_epoch(epoch) {
            log::debug!("[Session] State changed during grace delay");
            return;
        }
        if !self.transport.is_connected() {
            log::debug!("[Session] Connection dropped during grace delay");
            return;
        }
        match self.begin_flush() {
            FlushStart::Busy => log::debug!("[Session] Flush already running"),
            FlushStart::Empty => {
                log::info!("[Session] Connected with empty queue; requesting genres");
                self.send_command(Command::GetGenres).await;
            }
            FlushStart::Started => {
                let sent = self.flush_pending().await;
                log::info!("[Session] Flushed {} queued command(s)", sent);
            }
        }
    }

    fn begin_flush(&self) -> FlushStart {
        let mut inner = self.inner.lock();
        if inner.flushing {
            FlushStart::Busy
        } else if inner.pending.is_empty() {
            FlushStart::Empty
        } else {
            inner.flushing = true;
            FlushStart::Started
        }
    }

    /// Sends queued commands in order until the queue is empty.
    ///
    /// The caller must own the flush (see [`begin_flush`](Self::begin_flush)).
    /// Commands submitted meanwhile queue behind the flush. Stops, keeping
    /// the rest queued, if the transport reports it is no longer connected.
    async fn flush_pending(&self) -> usize {
        let mut sent = 0;
        loop {
            let next = {
                let mut inner = self.inner.lock();
                let next = inner.pending.pop_front();
                if next.is_none() {
                    inner.flushing = false;
                }
                next
            };
            let Some(command) = next else {
                break;
            };
            match self.transport.send(Bytes::from(command.clone())).await {
                Ok(()) => sent += 1,
                Err(TransportError::NotConnected) => {
                    log::debug!("[Session] Disconnected mid-flush; keeping queue");
                    let mut inner = self.inner.lock();
                    inner.pending.push_front(command);
                    inner.flushing = false;
                    break;
                }
                Err(e) => log::warn!("[Session] Failed to send {}: {}", command, e),
            }
        }
        sent
    }

    fn set_connectivity(&self, connected: bool) {
        {
            let mut inner = self.inner.lock();
            if inner.connectivity == Some(connected) {
                return;
            }
            inner.connectivity = Some(connected);
        }
        self.emitter
            .emit_connection(ConnectionEvent::ConnectivityChanged {
                connected,
                timestamp: now_millis(),
            });
    }

    fn apply_outcome(self: &Arc<Self>, outcome: DispatchOutcome) {
        let DispatchOutcome {
            liveness,
            commands,
            album_artwork_check,
        } = outcome;

        if liveness {
            self.set_connectivity(true);
        }
        for command in commands {
            self.throttle.request(command);
        }
        if self.config.auto_sync_album_artwork && !album_artwork_check.is_empty() {
            let session = Arc::clone(self);
            self.spawner
                .spawn_until_cancelled(self.cancel.clone(), async move {
                    session.sync_album_artwork(&album_artwork_check).await;
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::artwork::ArtworkCacheConfig;
    use crate::events::{BroadcastEvent, LibraryEvent};
    use crate::test_fixtures::{candidate, sample_png_base64, RecordingEmitter, ScriptedTransport};

    struct Harness {
        session: Arc<SessionManager>,
        transport: Arc<ScriptedTransport>,
        events: Arc<RecordingEmitter>,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            artwork: ArtworkCacheConfig {
                cache_dir: dir.path().to_path_buf(),
                ..ArtworkCacheConfig::default()
            },
            auto_sync_album_artwork: false,
            ..Config::default()
        };
        let spawner = TokioSpawner::current();
        let cache = Arc::new(ArtworkCache::new(&config.artwork, &spawner).unwrap());
        let transport = Arc::new(ScriptedTransport::default());
        let events = Arc::new(RecordingEmitter::default());
        let session = Arc::new(SessionManager::new(
            config,
            transport.clone(),
            cache,
            events.clone(),
            spawner,
            CancellationToken::new(),
        ));
        Harness {
            session,
            transport,
            events,
            _dir: dir,
        }
    }

    fn state(state: SessionState) -> TransportEvent {
        TransportEvent::StateChanged {
            peer: "Mac".into(),
            state,
        }
    }

    fn connection_events(events: &RecordingEmitter) -> Vec<ConnectionEvent> {
        events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                BroadcastEvent::Connection(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    const PAST_GRACE: Duration = Duration::from_millis(1050);

    #[tokio::test(start_paused = true)]
    async fn queued_commands_flush_in_order_after_grace() {
        let h = harness();
        for cmd in ["playSong:1", "next", "search:blue"] {
            h.session.send_raw(cmd).await;
        }
        assert_eq!(h.session.pending_len(), 3);
        assert!(h.transport.sent().is_empty());

        h.transport.set_connected(true);
        h.session
            .handle_transport_event(state(SessionState::Connected))
            .await;
        // Nothing goes out during the grace delay
        assert!(h.transport.sent().is_empty());

        tokio::time::sleep(PAST_GRACE).await;
        assert_eq!(h.transport.sent(), ["playSong:1", "next", "search:blue"]);
        assert_eq!(h.session.pending_len(), 0);

        // A later reconnect does not resend anything
        h.session
            .handle_transport_event(state(SessionState::Disconnected))
            .await;
        h.session
            .handle_transport_event(state(SessionState::Connected))
            .await;
        tokio::time::sleep(PAST_GRACE).await;
        assert_eq!(h.transport.sent()[..3], ["playSong:1", "next", "search:blue"]);
        assert_eq!(h.transport.sent()[3..], ["getGenres"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_queue_bootstraps_with_genres() {
        let h = harness();
        h.transport.set_connected(true);
        h.session
            .handle_transport_event(state(SessionState::Connected))
            .await;
        tokio::time::sleep(PAST_GRACE).await;

        assert_eq!(h.transport.sent(), ["getGenres"]);
        assert!(h.events.events().contains(&BroadcastEvent::Request(
            RequestEvent::Started {
                command: "getGenres".into()
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn new_commands_wait_behind_the_queue() {
        let h = harness();
        h.session.send_raw("first").await;
        h.transport.set_connected(true);
        // Connected, but the queue has not been flushed yet
        h.session.send_raw("second").await;
        assert_eq!(h.session.pending_len(), 2);

        h.session
            .handle_transport_event(state(SessionState::Connected))
            .await;
        tokio::time::sleep(PAST_GRACE).await;
        assert_eq!(h.transport.sent(), ["first", "second"]);

        h.session.send_raw("third").await;
        assert_eq!(h.transport.sent(), ["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_flicker_flushes_queue_once() {
        let h = harness();
        h.transport.set_send_delay(Duration::from_millis(500));
        for cmd in ["a", "b", "c", "d"] {
            h.session.send_raw(cmd).await;
        }

        h.transport.set_connected(true);
        h.session
            .handle_transport_event(state(SessionState::Connected))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.session
            .handle_transport_event(state(SessionState::Disconnected))
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.session
            .handle_transport_event(state(SessionState::Connected))
            .await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(h.transport.sent(), ["a", "b", "c", "d"]);
        assert_eq!(h.session.pending_len(), 0);
        assert!(!connection_events(&h.events)
            .iter()
            .any(|event| matches!(event, ConnectionEvent::DisconnectConfirmed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_settles_share_one_flush() {
        let h = harness();
        h.transport.set_send_delay(Duration::from_millis(500));
        for cmd in ["a", "b", "c"] {
            h.session.send_raw(cmd).await;
        }
        h.transport.set_connected(true);
        let epoch = h.session.inner.lock().epoch;

        tokio::join!(
            h.session.on_connection_settled(epoch),
            h.session.on_connection_settled(epoch),
        );

        // The second caller neither resends nor bootstraps
        assert_eq!(h.transport.sent(), ["a", "b", "c"]);
        assert_eq!(h.session.pending_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_sent_mid_flush_queue_behind_it() {
        let h = harness();
        h.transport.set_send_delay(Duration::from_millis(500));
        h.session.send_raw("a").await;
        h.transport.set_connected(true);
        h.session
            .handle_transport_event(state(SessionState::Connected))
            .await;
        // Grace elapses and "a" is on the wire
        tokio::time::sleep(Duration::from_millis(1100)).await;
        h.session.send_raw("b").await;
        assert_eq!(h.session.pending_len(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(h.transport.sent(), ["a", "b"]);
        assert_eq!(h.session.pending_len(), 0);
    }

    #[tokio::test]
    async fn failed_send_is_not_requeued() {
        let h = harness();
        h.transport.set_connected(true);
        h.transport.set_fail_sends(true);

        h.session.send_command(Command::Play).await;

        assert_eq!(h.session.pending_len(), 0);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_states_are_suppressed() {
        let h = harness();
        h.transport.set_connected(true);
        for _ in 0..3 {
            h.session
                .handle_transport_event(state(SessionState::Connected))
                .await;
        }

        let changes: Vec<_> = connection_events(&h.events)
            .into_iter()
            .filter(|event| matches!(event, ConnectionEvent::StateChanged { .. }))
            .collect();
        assert_eq!(changes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_confirmed_after_debounce() {
        let h = harness();
        h.session
            .handle_transport_event(state(SessionState::Disconnected))
            .await;
        let confirmed = |h: &Harness| {
            connection_events(&h.events)
                .iter()
                .any(|event| matches!(event, ConnectionEvent::DisconnectConfirmed { .. }))
        };
        assert!(!confirmed(&h));

        tokio::time::sleep(Duration::from_millis(1050)).await;
        assert!(confirmed(&h));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_disconnect_is_not_confirmed() {
        let h = harness();
        h.session
            .handle_transport_event(state(SessionState::Disconnected))
            .await;
        // Transport recovers inside the window
        h.transport.set_connected(true);
        tokio::time::sleep(Duration::from_millis(1050)).await;

        assert!(!connection_events(&h.events)
            .iter()
            .any(|event| matches!(event, ConnectionEvent::DisconnectConfirmed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn one_outage_is_confirmed_once() {
        let h = harness();
        h.session
            .handle_transport_event(state(SessionState::Disconnected))
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.transport.set_connected(true);
        h.session
            .handle_transport_event(state(SessionState::Connected))
            .await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        h.transport.set_connected(false);
        h.session
            .handle_transport_event(state(SessionState::Disconnected))
            .await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let confirmed = connection_events(&h.events)
            .into_iter()
            .filter(|event| matches!(event, ConnectionEvent::DisconnectConfirmed { .. }))
            .count();
        assert_eq!(confirmed, 1);
    }

    #[tokio::test]
    async fn single_candidate_auto_connects_second_prompts() {
        let h = harness();
        h.session
            .handle_transport_event(TransportEvent::PeerFound(candidate("Mac")))
            .await;
        assert_eq!(h.transport.invites(), [candidate("Mac")]);
        // Bootstrap request waits for the connection
        assert_eq!(h.session.pending_len(), 1);

        h.session
            .handle_transport_event(TransportEvent::PeerFound(candidate("Mac")))
            .await;
        h.session
            .handle_transport_event(TransportEvent::PeerFound(candidate("iMac")))
            .await;

        assert_eq!(h.transport.invites().len(), 1);
        let multiple: Vec<_> = h
            .events
            .events()
            .into_iter()
            .filter_map(|event| match event {
                BroadcastEvent::Discovery(DiscoveryEvent::MultiplePeersFound { peers, .. }) => {
                    Some(peers)
                }
                _ => None,
            })
            .collect();
        assert_eq!(multiple, vec![vec![candidate("Mac"), candidate("iMac")]]);
        assert!(matches!(
            h.session.server_selection(),
            ServerSelection::Multiple(peers) if peers.len() == 2
        ));

        h.session
            .handle_transport_event(TransportEvent::PeerLost {
                display_name: "Mac".into(),
            })
            .await;
        assert_eq!(
            h.session.server_selection(),
            ServerSelection::Single(candidate("iMac"))
        );
    }

    #[tokio::test]
    async fn discovery_is_idempotent_and_refreshable() {
        let h = harness();
        h.session.start_discovery().await;
        h.session.start_discovery().await;
        assert_eq!(h.transport.browse_starts(), 1);
        assert!(h.session.is_discovering());

        h.session
            .handle_transport_event(TransportEvent::PeerFound(candidate("Mac")))
            .await;
        h.session.refresh_servers().await;

        assert_eq!(h.transport.browse_stops(), 1);
        assert_eq!(h.transport.browse_starts(), 2);
        assert_eq!(h.session.server_selection(), ServerSelection::None);

        h.session.stop_discovery().await;
        h.session.stop_discovery().await;
        assert_eq!(h.transport.browse_stops(), 2);
    }

    #[tokio::test]
    async fn bulk_artwork_request_sets_marker() {
        let h = harness();
        h.transport.set_connected(true);

        h.session.request_all_album_artworks().await;
        assert_eq!(h.session.artwork_task().current(), Some(ArtworkKind::Album));
        h.session.request_all_artist_artworks().await;
        assert_eq!(h.session.artwork_task().current(), Some(ArtworkKind::Artist));
        assert_eq!(
            h.transport.sent(),
            ["getAllAlbumArtworks", "getAllArtistArtworks"]
        );

        h.session.cancel_artwork_request();
        h.session.cancel_artwork_request();
        assert_eq!(h.session.artwork_task().current(), None);
    }

    #[tokio::test]
    async fn inbound_payload_signals_liveness() {
        let h = harness();
        h.session
            .handle_transport_event(TransportEvent::Received {
                peer: "Mac".into(),
                payload: Bytes::from_static(br#"{"type":"genres","data":["Jazz","Rock"]}"#),
            })
            .await;

        let events = h.events.events();
        assert!(matches!(
            events.first(),
            Some(BroadcastEvent::Connection(ConnectionEvent::ConnectivityChanged {
                connected: true,
                ..
            }))
        ));
        assert!(events.contains(&BroadcastEvent::Library(LibraryEvent::GenresUpdated {
            genres: vec!["Jazz".into(), "Rock".into()]
        })));
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_artwork_requests_are_spaced() {
        let h = harness();
        let (_tx, rx) = mpsc::channel(8);
        h.session.start(rx);
        h.transport.set_connected(true);

        assert!(h.session.request_artwork(ArtworkKind::Album, "A"));
        assert!(h.session.request_artwork(ArtworkKind::Album, "B"));
        assert!(!h.session.request_artwork(ArtworkKind::Album, "B"));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.transport.sent(), ["getAlbumArtwork:A"]);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(h.transport.sent(), ["getAlbumArtwork:A", "getAlbumArtwork:B"]);
    }

    #[tokio::test]
    async fn album_sync_requests_only_missing_artwork() {
        let h = harness();
        h.session
            .artwork_cache()
            .store_base64(&sample_png_base64(2, 2), "Cached")
            .unwrap();

        let names = vec!["Cached".to_string(), "  ".to_string(), "Missing".to_string()];
        assert_eq!(h.session.sync_album_artwork(&names).await, 1);
        // Already queued
        assert_eq!(h.session.sync_album_artwork(&names).await, 0);
    }
}
