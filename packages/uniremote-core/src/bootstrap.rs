//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. Consumers receive handles
//! from [`BootstrappedServices`] instead of reaching for process-wide state.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::artwork::ArtworkCache;
use crate::error::{RemoteError, RemoteResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::identity::PeerIdentity;
use crate::runtime::TokioSpawner;
use crate::session::SessionManager;
use crate::state::Config;
use crate::transport::{LanTransport, PeerTransport, TransportEvent};

/// Container for all bootstrapped services.
pub struct BootstrappedServices {
    /// Session manager: discovery, connection lifecycle, commands.
    pub session: Arc<SessionManager>,
    /// Two-tier artwork cache shared with the dispatcher.
    pub artwork_cache: Arc<ArtworkCache>,
    /// Event bridge; subscribe here for presentation events.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Transport the session talks through.
    pub transport: Arc<dyn PeerTransport>,
    /// Concrete LAN transport, kept for shutdown.
    lan_transport: Option<Arc<LanTransport>>,
    /// Transport event receiver until the dispatch loop takes it.
    transport_events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Starts the session's dispatch loop and artwork request worker.
    ///
    /// Idempotent: only the first call starts anything.
    pub fn start_background_tasks(&self) {
        match self.transport_events.lock().take() {
            Some(events) => {
                self.session.start(events);
                log::info!("[Bootstrap] Background tasks started");
            }
            None => log::debug!("[Bootstrap] Background tasks already started"),
        }
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        self.session.stop_discovery().await;

        // Signal cancellation to all background tasks
        self.cancel_token.cancel();

        if let Some(lan) = &self.lan_transport {
            lan.close();
        }

        if let Err(e) = self.artwork_cache.flush().await {
            log::warn!("[Bootstrap] Artwork flush failed: {}", e);
        }

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services on the LAN transport.
///
/// Wiring order:
///
/// 1. Shared infrastructure (spawner, cancellation token, channels)
/// 2. LAN transport (depends on identity and the transport event channel)
/// 3. Artwork cache, event bridge and session manager
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the artwork cache
/// directory cannot be created.
pub fn bootstrap_services(
    config: &Config,
    identity: PeerIdentity,
) -> RemoteResult<BootstrappedServices> {
    config.validate().map_err(RemoteError::Configuration)?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(config.transport_channel_capacity);

    log::info!(
        "[Bootstrap] Identity {} ({})",
        identity.id,
        identity.display_name
    );
    let lan = Arc::new(LanTransport::new(
        identity,
        config.service_type.clone(),
        events_tx,
        spawner.clone(),
        cancel_token.clone(),
    ));

    wire(
        config,
        Arc::clone(&lan) as Arc<dyn PeerTransport>,
        events_rx,
        Some(lan),
        spawner,
        cancel_token,
    )
}

/// Bootstraps all services on a caller-supplied transport.
///
/// `transport_events` must be the receiving end of the channel the transport
/// reports on.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the artwork cache
/// directory cannot be created.
pub fn bootstrap_services_with_transport(
    config: &Config,
    transport: Arc<dyn PeerTransport>,
    transport_events: mpsc::Receiver<TransportEvent>,
) -> RemoteResult<BootstrappedServices> {
    config.validate().map_err(RemoteError::Configuration)?;
    wire(
        config,
        transport,
        transport_events,
        None,
        TokioSpawner::current(),
        CancellationToken::new(),
    )
}

fn wire(
    config: &Config,
    transport: Arc<dyn PeerTransport>,
    transport_events: mpsc::Receiver<TransportEvent>,
    lan_transport: Option<Arc<LanTransport>>,
    spawner: TokioSpawner,
    cancel_token: CancellationToken,
) -> RemoteResult<BootstrappedServices> {
    let artwork_cache = Arc::new(ArtworkCache::new(&config.artwork, &spawner)?);

    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));

    let session = Arc::new(SessionManager::new(
        config.clone(),
        Arc::clone(&transport),
        Arc::clone(&artwork_cache),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        spawner.clone(),
        cancel_token.clone(),
    ));

    Ok(BootstrappedServices {
        session,
        artwork_cache,
        event_bridge,
        transport,
        lan_transport,
        transport_events: Mutex::new(Some(transport_events)),
        spawner,
        cancel_token,
    })
}
