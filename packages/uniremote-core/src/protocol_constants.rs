//! Fixed protocol constants shared with the desktop companion.
//!
//! The companion process expects these values; changing them breaks
//! interoperability with existing servers.

// ─────────────────────────────────────────────────────────────────────────────
// Discovery
// ─────────────────────────────────────────────────────────────────────────────

/// DNS-SD service type advertised by the desktop companion.
///
/// Trailing dot is required by mdns-sd.
pub const SERVICE_TYPE: &str = "_music-control._tcp.local.";

/// Timeout for a connection attempt to a discovered companion (seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Session timing
// ─────────────────────────────────────────────────────────────────────────────

/// Delay after entering `connected` before the pending queue is flushed.
///
/// Absorbs the connect/disconnect flicker some transports report right
/// after an invitation is accepted.
pub const CONNECT_GRACE_MS: u64 = 1000;

/// Window after a disconnect before it is confirmed to the presentation layer.
pub const DISCONNECT_DEBOUNCE_MS: u64 = 1000;

/// Spacing between throttled single-item artwork requests.
pub const ARTWORK_REQUEST_INTERVAL_MS: u64 = 150;

// ─────────────────────────────────────────────────────────────────────────────
// Wire framing
// ─────────────────────────────────────────────────────────────────────────────

/// Size of the big-endian length prefix in front of every frame.
pub const FRAME_LEN_SIZE: usize = 4;

/// Largest frame accepted from or sent to the companion (16 MiB).
///
/// Bulk artwork replies carry base64 images for a whole library and are the
/// largest payloads on the wire.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Plain-text liveness message sent by the companion.
pub const LIVENESS_MESSAGE: &str = "connected";

// ─────────────────────────────────────────────────────────────────────────────
// Artwork cache
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of decoded images kept in memory.
pub const ARTWORK_COUNT_LIMIT: usize = 300;

/// Maximum total decoded pixel bytes kept in memory (256 MiB).
pub const ARTWORK_COST_LIMIT_BYTES: usize = 256 * 1024 * 1024;

/// JPEG quality used when persisting artwork to disk (0.6 on a 0-1 scale).
pub const ARTWORK_JPEG_QUALITY: u8 = 60;

/// File extension for persisted artwork.
pub const ARTWORK_FILE_EXTENSION: &str = "jpg";

/// Directory name of the disk tier inside the cache root.
pub const ARTWORK_DIR_NAME: &str = "ArtworkCache";

// ─────────────────────────────────────────────────────────────────────────────
// Channels
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Capacity of the transport → session event channel.
pub const TRANSPORT_CHANNEL_CAPACITY: usize = 256;
