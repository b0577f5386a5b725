//! Core configuration.
//!
//! [`Config`] holds every tunable of the session, transport and artwork cache.
//! The binary builds it from YAML and environment overrides; the library only
//! needs a validated instance.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artwork::ArtworkCacheConfig;
use crate::protocol_constants::{
    ARTWORK_REQUEST_INTERVAL_MS, CONNECT_GRACE_MS, CONNECT_TIMEOUT_SECS, DISCONNECT_DEBOUNCE_MS,
    EVENT_CHANNEL_CAPACITY, SERVICE_TYPE, TRANSPORT_CHANNEL_CAPACITY,
};

/// Configuration for the UniRemote core.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    // Discovery
    /// DNS-SD service type the companion advertises.
    pub service_type: String,

    // Session
    /// Bound on a single connection attempt (seconds).
    pub connect_timeout_secs: u64,

    /// Delay after `connected` before flushing queued commands (milliseconds).
    pub connect_grace_ms: u64,

    /// Window a disconnect must survive before it is confirmed (milliseconds).
    pub disconnect_debounce_ms: u64,

    // Artwork
    /// Spacing between throttled per-item artwork requests (milliseconds).
    pub artwork_request_interval_ms: u64,

    /// Request missing album artwork whenever an album listing arrives.
    pub auto_sync_album_artwork: bool,

    /// Artwork cache configuration.
    pub artwork: ArtworkCacheConfig,

    // Channels
    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    /// Capacity of the transport event channel.
    pub transport_channel_capacity: usize,
}

impl Config {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if !self.service_type.ends_with(".local.") {
            return Err(format!(
                "service_type must be a fully qualified DNS-SD type ending in `.local.`, got `{}`",
                self.service_type
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be >= 1".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.transport_channel_capacity == 0 {
            return Err(
                "transport_channel_capacity must be >= 1 (mpsc::channel panics on 0)".to_string(),
            );
        }
        self.artwork.validate()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn connect_grace(&self) -> Duration {
        Duration::from_millis(self.connect_grace_ms)
    }

    pub fn disconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.disconnect_debounce_ms)
    }

    pub fn artwork_request_interval(&self) -> Duration {
        Duration::from_millis(self.artwork_request_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_type: SERVICE_TYPE.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            connect_grace_ms: CONNECT_GRACE_MS,
            disconnect_debounce_ms: DISCONNECT_DEBOUNCE_MS,
            artwork_request_interval_ms: ARTWORK_REQUEST_INTERVAL_MS,
            auto_sync_album_artwork: true,
            artwork: ArtworkCacheConfig::default(),
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            transport_channel_capacity: TRANSPORT_CHANNEL_CAPACITY,
        }
    }
}
