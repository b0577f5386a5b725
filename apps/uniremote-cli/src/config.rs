//! Client configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use uniremote_core::protocol_constants::{
    ARTWORK_DIR_NAME, CONNECT_GRACE_MS, CONNECT_TIMEOUT_SECS, DISCONNECT_DEBOUNCE_MS, SERVICE_TYPE,
};
use uniremote_core::{ArtworkCacheConfig, Config};

/// Client configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name shown to the companion. Defaults to the host name.
    /// Override: `UNIREMOTE_DISPLAY_NAME`
    pub display_name: Option<String>,

    /// DNS-SD service type to browse for.
    /// Override: `UNIREMOTE_SERVICE_TYPE`
    pub service_type: String,

    /// Connection attempt timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Delay after connecting before queued commands are sent (milliseconds).
    pub connect_grace_ms: u64,

    /// How long a disconnect must last before it is reported (milliseconds).
    /// Override: `UNIREMOTE_DISCONNECT_DEBOUNCE_MS`
    pub disconnect_debounce_ms: u64,

    /// Request missing album artwork whenever albums are listed.
    pub auto_sync_album_artwork: bool,

    /// Directory for the device identity.
    /// Override: `UNIREMOTE_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Directory for cached artwork.
    /// Override: `UNIREMOTE_CACHE_DIR`
    pub cache_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            service_type: SERVICE_TYPE.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            connect_grace_ms: CONNECT_GRACE_MS,
            disconnect_debounce_ms: DISCONNECT_DEBOUNCE_MS,
            auto_sync_album_artwork: true,
            data_dir: None,
            cache_dir: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("UNIREMOTE_DISPLAY_NAME") {
            if !val.trim().is_empty() {
                self.display_name = Some(val);
            }
        }

        if let Ok(val) = std::env::var("UNIREMOTE_SERVICE_TYPE") {
            self.service_type = val;
        }

        if let Ok(val) = std::env::var("UNIREMOTE_DISCONNECT_DEBOUNCE_MS") {
            if let Ok(ms) = val.parse() {
                self.disconnect_debounce_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("UNIREMOTE_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(val));
        }

        // Note: UNIREMOTE_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Returns the identity directory, falling back to the platform data dir.
    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.data_dir().to_path_buf()),
        }
    }

    /// Returns the artwork directory, falling back to the platform cache dir.
    pub fn resolved_cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(project_dirs()?.cache_dir().join(ARTWORK_DIR_NAME)),
        }
    }

    /// Converts to uniremote-core's Config type.
    pub fn to_core_config(&self, cache_dir: PathBuf) -> Config {
        Config {
            service_type: self.service_type.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
            connect_grace_ms: self.connect_grace_ms,
            disconnect_debounce_ms: self.disconnect_debounce_ms,
            auto_sync_album_artwork: self.auto_sync_album_artwork,
            artwork: ArtworkCacheConfig {
                cache_dir,
                ..ArtworkCacheConfig::default()
            },
            ..Config::default()
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "uniremote", "uniremote")
        .context("Could not determine a home directory; pass --data-dir and set cache_dir")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ClientConfig::from_yaml("disconnect_debounce_ms: 2500\n").unwrap();
        assert_eq!(config.disconnect_debounce_ms, 2500);
        assert_eq!(config.service_type, SERVICE_TYPE);
        assert!(config.auto_sync_album_artwork);
    }

    #[test]
    fn core_config_carries_overrides() {
        let config = ClientConfig {
            connect_grace_ms: 250,
            auto_sync_album_artwork: false,
            ..ClientConfig::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let core = config.to_core_config(dir.path().to_path_buf());
        assert_eq!(core.connect_grace_ms, 250);
        assert!(!core.auto_sync_album_artwork);
        assert_eq!(core.artwork.cache_dir, dir.path());
        assert!(core.validate().is_ok());
    }

    #[test]
    fn explicit_dirs_win() {
        let config = ClientConfig {
            data_dir: Some(PathBuf::from("/tmp/remote-data")),
            cache_dir: Some(PathBuf::from("/tmp/remote-cache")),
            ..ClientConfig::default()
        };
        assert_eq!(
            config.resolved_data_dir().unwrap(),
            PathBuf::from("/tmp/remote-data")
        );
        assert_eq!(
            config.resolved_cache_dir().unwrap(),
            PathBuf::from("/tmp/remote-cache")
        );
    }
}
