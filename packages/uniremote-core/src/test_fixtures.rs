//! Shared test doubles and sample payloads.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use parking_lot::Mutex;

use crate::events::{
    ArtworkEvent, BroadcastEvent, ConnectionEvent, DiscoveryEvent, EventEmitter, LibraryEvent,
    PlaybackEvent, RequestEvent,
};
use crate::transport::{PeerCandidate, PeerTransport, TransportError};

/// Base64 PNG of a `width` x `height` image.
pub(crate) fn sample_png_base64(width: u32, height: u32) -> String {
    let mut png = Cursor::new(Vec::new());
    DynamicImage::new_rgb8(width, height)
        .write_to(&mut png, ImageFormat::Png)
        .unwrap();
    base64::engine::general_purpose::STANDARD.encode(png.into_inner())
}

pub(crate) fn candidate(name: &str) -> PeerCandidate {
    PeerCandidate {
        id: format!("{name}._music-control._tcp.local."),
        display_name: name.to_string(),
        endpoint: "192.168.1.20:5050".to_string(),
    }
}

/// Collects every event in emission order.
#[derive(Default)]
pub(crate) struct RecordingEmitter {
    events: Mutex<Vec<BroadcastEvent>>,
}

impl RecordingEmitter {
    pub(crate) fn events(&self) -> Vec<BroadcastEvent> {
        self.events.lock().clone()
    }

    fn push(&self, event: impl Into<BroadcastEvent>) {
        self.events.lock().push(event.into());
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_connection(&self, event: ConnectionEvent) {
        self.push(event);
    }
    fn emit_discovery(&self, event: DiscoveryEvent) {
        self.push(event);
    }
    fn emit_library(&self, event: LibraryEvent) {
        self.push(event);
    }
    fn emit_artwork(&self, event: ArtworkEvent) {
        self.push(event);
    }
    fn emit_playback(&self, event: PlaybackEvent) {
        self.push(event);
    }
    fn emit_request(&self, event: RequestEvent) {
        self.push(event);
    }
}

/// In-memory transport. Tests flip connectivity and read back what was sent.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    connected: AtomicBool,
    fail_sends: AtomicBool,
    send_delay_ms: AtomicU64,
    browse_starts: AtomicUsize,
    browse_stops: AtomicUsize,
    sent: Mutex<Vec<String>>,
    invites: Mutex<Vec<PeerCandidate>>,
}

impl ScriptedTransport {
    pub(crate) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(crate) fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Makes every `send` sleep for `delay` before it completes.
    pub(crate) fn set_send_delay(&self, delay: Duration) {
        self.send_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub(crate) fn invites(&self) -> Vec<PeerCandidate> {
        self.invites.lock().clone()
    }

    pub(crate) fn browse_starts(&self) -> usize {
        self.browse_starts.load(Ordering::SeqCst)
    }

    pub(crate) fn browse_stops(&self) -> usize {
        self.browse_stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerTransport for ScriptedTransport {
    async fn start_browsing(&self) -> Result<(), TransportError> {
        self.browse_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_browsing(&self) {
        self.browse_stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn invite(&self, candidate: &PeerCandidate, _timeout: Duration) {
        self.invites.lock().push(candidate.clone());
    }

    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        let delay = self.send_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent
            .lock()
            .push(String::from_utf8_lossy(&payload).into_owned());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
