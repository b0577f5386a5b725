//! LAN transport: DNS-SD discovery and a framed TCP session.
//!
//! # Key Design Points
//!
//! - Candidates come from resolved DNS-SD records; the display name is the
//!   service instance name and the endpoint is the first IPv4 address
//! - One session at a time; a new invite replaces the previous connection
//! - Every connection carries a generation number so a reader that outlives
//!   its connection cannot report a disconnect for a newer one
//! - Outbound payloads go through a per-connection writer task, keeping
//!   frames ordered and `send` free of socket I/O

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mdns_sd::{ResolvedService, ScopedIp, ServiceDaemon, ServiceEvent};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::frame::{read_frame, write_frame};
use super::{PeerCandidate, PeerTransport, SessionState, TransportError, TransportEvent};
use crate::identity::PeerIdentity;
use crate::protocol_constants::MAX_FRAME_LEN;
use crate::runtime::{TaskSpawner, TokioSpawner};

/// Outbound frames buffered per connection before `send` waits.
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

struct Connection {
    generation: u64,
    peer: String,
    outbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

struct Shared {
    identity: PeerIdentity,
    events: mpsc::Sender<TransportEvent>,
    generation: AtomicU64,
    connection: Mutex<Option<Connection>>,
}

impl Shared {
    async fn emit(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            log::debug!("[Transport] Event receiver dropped");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Clears the connection slot if it still belongs to `generation`.
    fn release(&self, generation: u64) -> bool {
        let mut slot = self.connection.lock();
        match slot.as_ref() {
            Some(conn) if conn.generation == generation => {
                if let Some(conn) = slot.take() {
                    conn.cancel.cancel();
                }
                true
            }
            _ => false,
        }
    }
}

/// [`PeerTransport`] over the local network.
pub struct LanTransport {
    shared: Arc<Shared>,
    service_type: String,
    spawner: TokioSpawner,
    daemon: Mutex<Option<ServiceDaemon>>,
    browse_token: Mutex<Option<CancellationToken>>,
    shutdown: CancellationToken,
}

impl LanTransport {
    /// Creates a transport that reports on `events`.
    ///
    /// The mDNS daemon is created on the first [`start_browsing`](PeerTransport::start_browsing).
    pub fn new(
        identity: PeerIdentity,
        service_type: impl Into<String>,
        events: mpsc::Sender<TransportEvent>,
        spawner: TokioSpawner,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                identity,
                events,
                generation: AtomicU64::new(0),
                connection: Mutex::new(None),
            }),
            service_type: service_type.into(),
            spawner,
            daemon: Mutex::new(None),
            browse_token: Mutex::new(None),
            shutdown,
        }
    }

    /// Drops the current connection, if any, and shuts the mDNS daemon down.
    pub fn close(&self) {
        if let Some(conn) = self.shared.connection.lock().take() {
            conn.cancel.cancel();
        }
        if let Some(token) = self.browse_token.lock().take() {
            token.cancel();
        }
        if let Some(daemon) = self.daemon.lock().take() {
            if let Err(e) = daemon.shutdown() {
                log::warn!("[Transport] Failed to shut down mDNS daemon: {:?}", e);
            }
        }
    }

    fn daemon(&self) -> Result<ServiceDaemon, TransportError> {
        let mut slot = self.daemon.lock();
        if let Some(daemon) = slot.as_ref() {
            return Ok(daemon.clone());
        }
        let daemon = ServiceDaemon::new().map_err(|e| TransportError::Mdns(e.to_string()))?;
        *slot = Some(daemon.clone());
        Ok(daemon)
    }
}

#[async_trait]
impl PeerTransport for LanTransport {
    async fn start_browsing(&self) -> Result<(), TransportError> {
        let token = {
            let mut slot = self.browse_token.lock();
            if slot.is_some() {
                return Ok(());
            }
            let token = self.shutdown.child_token();
            *slot = Some(token.clone());
            token
        };

        let receiver = match self
            .daemon()
            .and_then(|daemon| {
                daemon
                    .browse(&self.service_type)
                    .map_err(|e| TransportError::Mdns(e.to_string()))
            }) {
            Ok(receiver) => receiver,
            Err(e) => {
                self.browse_token.lock().take();
                return Err(e);
            }
        };

        log::info!("[Transport] Browsing for {}", self.service_type);
        let shared = Arc::clone(&self.shared);
        let service_type = self.service_type.clone();
        self.spawner.spawn_until_cancelled(token, async move {
            loop {
                let event = match receiver.recv_async().await {
                    Ok(event) => event,
                    Err(e) => {
                        log::debug!("[Transport] Browse channel closed: {:?}", e);
                        break;
                    }
                };
                match event {
                    ServiceEvent::ServiceResolved(info) => {
                        log::trace!("[Transport] Service resolved: {}", info.fullname);
                        if let Some(candidate) = parse_candidate(&info, &service_type) {
                            shared.emit(TransportEvent::PeerFound(candidate)).await;
                        }
                    }
                    ServiceEvent::ServiceRemoved(_, fullname) => {
                        shared
                            .emit(TransportEvent::PeerLost {
                                display_name: instance_name(&fullname, &service_type),
                            })
                            .await;
                    }
                    other => log::trace!("[Transport] Ignoring browse event: {:?}", other),
                }
            }
        });
        Ok(())
    }

    async fn stop_browsing(&self) {
        let token = self.browse_token.lock().take();
        let Some(token) = token else {
            return;
        };
        token.cancel();
        if let Some(daemon) = self.daemon.lock().as_ref() {
            if let Err(e) = daemon.stop_browse(&self.service_type) {
                log::warn!("[Transport] Failed to stop browse: {:?}", e);
            }
        }
        log::info!("[Transport] Stopped browsing");
    }

    async fn invite(&self, candidate: &PeerCandidate, timeout: Duration) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.shared.connection.lock().take() {
            log::info!("[Transport] Replacing session with {}", previous.peer);
            previous.cancel.cancel();
        }

        let peer = candidate.display_name.clone();
        let endpoint = candidate.endpoint.clone();
        let shared = Arc::clone(&self.shared);
        let cancel = self.shutdown.child_token();
        let spawner = self.spawner.clone();
        // Events are emitted from the connect task only: the caller may be
        // the task that drains the event channel.
        self.spawner.spawn(async move {
            if !shared.is_current(generation) {
                return;
            }
            shared
                .emit(TransportEvent::StateChanged {
                    peer: peer.clone(),
                    state: SessionState::Connecting,
                })
                .await;
            log::info!("[Transport] Connecting to {} at {}", peer, endpoint);
            let stream = match tokio::time::timeout(timeout, TcpStream::connect(&endpoint)).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    let err = TransportError::Connect(e.to_string());
                    fail_attempt(&shared, generation, &peer, &err).await;
                    return;
                }
                Err(_) => {
                    fail_attempt(&shared, generation, &peer, &TransportError::Timeout(timeout))
                        .await;
                    return;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                log::debug!("[Transport] Failed to set TCP_NODELAY: {}", e);
            }

            let (reader, mut writer) = stream.into_split();
            if let Err(e) = write_frame(&mut writer, &hello_frame(&shared.identity)).await {
                fail_attempt(&shared, generation, &peer, &e).await;
                return;
            }

            let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
            {
                let mut slot = shared.connection.lock();
                if !shared.is_current(generation) {
                    log::debug!("[Transport] Discarding superseded connection to {}", peer);
                    return;
                }
                *slot = Some(Connection {
                    generation,
                    peer: peer.clone(),
                    outbound: outbound_tx,
                    cancel: cancel.clone(),
                });
            }

            log::info!("[Transport] Connected to {}", peer);
            shared
                .emit(TransportEvent::StateChanged {
                    peer: peer.clone(),
                    state: SessionState::Connected,
                })
                .await;

            spawner.spawn(run_writer(writer, outbound_rx, cancel.clone()));
            run_reader(&shared, reader, &peer, cancel).await;

            if shared.release(generation) {
                log::info!("[Transport] Session with {} ended", peer);
                shared
                    .emit(TransportEvent::StateChanged {
                        peer,
                        state: SessionState::Disconnected,
                    })
                    .await;
            }
        });
    }

    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(payload.len()));
        }
        let outbound = self
            .shared
            .connection
            .lock()
            .as_ref()
            .map(|conn| conn.outbound.clone())
            .ok_or(TransportError::NotConnected)?;
        outbound
            .send(payload)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn is_connected(&self) -> bool {
        self.shared.connection.lock().is_some()
    }
}

async fn fail_attempt(shared: &Shared, generation: u64, peer: &str, err: &TransportError) {
    log::warn!("[Transport] Connection to {} failed: {}", peer, err);
    if shared.is_current(generation) {
        shared
            .emit(TransportEvent::StateChanged {
                peer: peer.to_string(),
                state: SessionState::Disconnected,
            })
            .await;
    }
}

async fn run_reader(
    shared: &Shared,
    mut reader: OwnedReadHalf,
    peer: &str,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };
        match frame {
            Ok(Some(payload)) => {
                shared
                    .emit(TransportEvent::Received {
                        peer: peer.to_string(),
                        payload,
                    })
                    .await;
            }
            Ok(None) => {
                log::debug!("[Transport] {} closed the connection", peer);
                break;
            }
            Err(e) => {
                log::warn!("[Transport] Read from {} failed: {}", peer, e);
                break;
            }
        }
    }
}

async fn run_writer(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            _ = cancel.cancelled() => break,
            payload = outbound.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };
        if let Err(e) = write_frame(&mut writer, &payload).await {
            log::warn!("[Transport] Write failed: {}", e);
            cancel.cancel();
            break;
        }
    }
}

fn hello_frame(identity: &PeerIdentity) -> Vec<u8> {
    json!({
        "type": "hello",
        "id": identity.id,
        "displayName": identity.display_name,
    })
    .to_string()
    .into_bytes()
}

/// Builds a candidate from a resolved record. Requires an IPv4 address.
fn parse_candidate(info: &ResolvedService, service_type: &str) -> Option<PeerCandidate> {
    let ip = info.addresses.iter().find_map(|addr| match addr {
        ScopedIp::V4(v4) => Some(v4.addr().to_string()),
        ScopedIp::V6(_) | _ => None,
    })?;

    Some(PeerCandidate {
        id: info.fullname.clone(),
        display_name: instance_name(&info.fullname, service_type),
        endpoint: format!("{}:{}", ip, info.port),
    })
}

/// Extracts the instance label from a DNS-SD full name.
///
/// `Living Room._music-control._tcp.local.` → `Living Room`
fn instance_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .and_then(|rest| rest.strip_suffix('.'))
        .unwrap_or(fullname)
        .to_string()
}
